//! Canonical symbolic expressions
//!
//! An [`Expr`] is a sum of terms `coeff * Π atom^e` kept in a sorted map, so
//! two expressions that are equal as Laurent polynomials over their atoms are
//! structurally equal. Atoms are plain symbols, elementary functions of an
//! expression, and inverted multi-term sums (rational functions).
//!
//! Invariants held by every constructor:
//! - no stored coefficient is zero
//! - a `Group` atom always carries a negative exponent and its base is a sum
//!   whose leading coefficient is 1
//! - a `sqrt` atom never carries an exponent of magnitude 2 or more
//! - a `cos` atom never carries an exponent of 2 or more (`cos^2 = 1 - sin^2`)
//!
//! Inverted sums make the map form of a rational function non-unique, so
//! zero tests that must be exact go through [`Expr::numerator`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Mul, Neg, Sub};

use super::parse::{parse_expr, ParseError};

/// Relative magnitude below which a combined coefficient counts as cancelled.
const CANCEL_TOLERANCE: f64 = 1e-12;

/// Bound on denominator clearing passes (nested inverted sums need more than one).
const MAX_CLEAR_PASSES: usize = 8;

/// Named scalar variable (states and parameters share one namespace).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Symbol(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

/// Build a list of symbols from names
pub fn symbols(names: &[&str]) -> Vec<Symbol> {
    names.iter().map(|n| Symbol::new(*n)).collect()
}

/// f64 coefficient with a total order so expressions can be map keys.
#[derive(Clone, Copy, Debug)]
struct Real(f64);

impl Real {
    fn new(value: f64) -> Self {
        // fold -0.0 into 0.0
        if value == 0.0 {
            Real(0.0)
        } else {
            Real(value)
        }
    }
}

impl PartialEq for Real {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Real {}

impl PartialOrd for Real {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Real {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Real {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Elementary functions understood by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Exp => "exp",
            Func::Ln => "ln",
            Func::Sqrt => "sqrt",
        }
    }

    pub fn from_name(name: &str) -> Option<Func> {
        match name {
            "sin" => Some(Func::Sin),
            "cos" => Some(Func::Cos),
            "tan" => Some(Func::Tan),
            "exp" => Some(Func::Exp),
            "ln" | "log" => Some(Func::Ln),
            "sqrt" => Some(Func::Sqrt),
            _ => None,
        }
    }

    fn eval(self, v: f64) -> f64 {
        match self {
            Func::Sin => v.sin(),
            Func::Cos => v.cos(),
            Func::Tan => v.tan(),
            Func::Exp => v.exp(),
            Func::Ln => v.ln(),
            Func::Sqrt => v.sqrt(),
        }
    }

    /// Outer derivative f'(arg)
    fn derivative(self, arg: &Expr) -> Expr {
        match self {
            Func::Sin => Expr::apply(Func::Cos, arg.clone()),
            Func::Cos => Expr::apply(Func::Sin, arg.clone()).neg_ref(),
            Func::Tan => Expr::one().add_ref(&Expr::apply(Func::Tan, arg.clone()).powi(2)),
            Func::Exp => Expr::apply(Func::Exp, arg.clone()),
            Func::Ln => arg.powi(-1),
            Func::Sqrt => Expr::apply(Func::Sqrt, arg.clone()).powi(-1).scale(0.5),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Atom {
    Sym(Symbol),
    Func(Func, Box<Expr>),
    Group(Box<Expr>),
}

impl Atom {
    /// Whether `atom^exp` has a lower-degree canonical form
    fn is_reducible(&self, exp: i32) -> bool {
        match self {
            Atom::Func(Func::Sqrt, _) => exp.abs() >= 2,
            Atom::Func(Func::Cos, _) => exp >= 2,
            _ => false,
        }
    }

    fn diff(&self, var: &Symbol) -> Expr {
        match self {
            Atom::Sym(s) if s == var => Expr::one(),
            Atom::Sym(_) => Expr::zero(),
            Atom::Func(func, arg) => {
                let inner = arg.diff(var);
                if inner.is_zero() {
                    Expr::zero()
                } else {
                    func.derivative(arg).mul_ref(&inner)
                }
            }
            Atom::Group(base) => base.diff(var),
        }
    }

    fn subs(&self, map: &HashMap<Symbol, Expr>) -> Expr {
        match self {
            Atom::Sym(s) => map.get(s).cloned().unwrap_or_else(|| Expr::from_symbol(s)),
            Atom::Func(func, arg) => Expr::apply(*func, arg.subs(map)),
            Atom::Group(base) => base.subs(map),
        }
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Atom::Sym(s) => {
                out.insert(s.clone());
            }
            Atom::Func(_, arg) | Atom::Group(arg) => arg.collect_symbols(out),
        }
    }
}

type Monomial = BTreeMap<Atom, i32>;

/// Symbolic scalar expression in canonical form
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Expr {
    terms: BTreeMap<Monomial, Real>,
}

impl Expr {
    pub fn zero() -> Self {
        Expr::default()
    }

    pub fn one() -> Self {
        Expr::num(1.0)
    }

    pub fn num(value: f64) -> Self {
        let mut e = Expr::zero();
        e.push_term(Monomial::new(), value);
        e
    }

    pub fn sym(name: &str) -> Self {
        Expr::from_symbol(&Symbol::new(name))
    }

    pub fn from_symbol(symbol: &Symbol) -> Self {
        Expr::from_atom(Atom::Sym(symbol.clone()), 1)
    }

    /// Parse the textual form produced by `Display` (and ordinary math input).
    pub fn parse(text: &str) -> Result<Expr, ParseError> {
        parse_expr(text)
    }

    /// Apply an elementary function; constant arguments are folded.
    pub fn apply(func: Func, arg: Expr) -> Expr {
        match arg.as_constant() {
            Some(v) => Expr::num(func.eval(v)),
            None => Expr::from_atom(Atom::Func(func, Box::new(arg)), 1),
        }
    }

    pub fn sin(&self) -> Expr {
        Expr::apply(Func::Sin, self.clone())
    }

    pub fn cos(&self) -> Expr {
        Expr::apply(Func::Cos, self.clone())
    }

    pub fn sqrt(&self) -> Expr {
        Expr::apply(Func::Sqrt, self.clone())
    }

    fn term(monomial: Monomial, coeff: f64) -> Self {
        let mut e = Expr::zero();
        e.push_term(monomial, coeff);
        e
    }

    fn from_atom(atom: Atom, exp: i32) -> Self {
        if exp == 0 {
            return Expr::one();
        }
        match atom {
            // positive powers of sums are always expanded
            Atom::Group(base) if exp > 0 => base.powi(exp),
            Atom::Func(Func::Sqrt, arg) if exp.abs() >= 2 => {
                let rest = exp % 2;
                let reduced = arg.powi(exp / 2);
                if rest == 0 {
                    reduced
                } else {
                    reduced.mul_ref(&Expr::from_atom(Atom::Func(Func::Sqrt, arg), rest))
                }
            }
            Atom::Func(Func::Cos, arg) if exp >= 2 => {
                let sin_sq = Expr::from_atom(Atom::Func(Func::Sin, arg.clone()), 2);
                let reduced = Expr::one().sub_ref(&sin_sq).powi(exp / 2);
                if exp % 2 == 0 {
                    reduced
                } else {
                    reduced.mul_ref(&Expr::from_atom(Atom::Func(Func::Cos, arg), 1))
                }
            }
            atom => {
                let mut m = Monomial::new();
                m.insert(atom, exp);
                Expr::term(m, 1.0)
            }
        }
    }

    fn push_term(&mut self, monomial: Monomial, coeff: f64) {
        if coeff == 0.0 {
            return;
        }
        match self.terms.entry(monomial) {
            Entry::Vacant(slot) => {
                slot.insert(Real::new(coeff));
            }
            Entry::Occupied(mut slot) => {
                let prev = slot.get().0;
                let sum = prev + coeff;
                if sum == 0.0 || sum.abs() <= CANCEL_TOLERANCE * prev.abs().max(coeff.abs()) {
                    slot.remove();
                } else {
                    *slot.get_mut() = Real::new(sum);
                }
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Value of a symbol-free expression
    pub fn as_constant(&self) -> Option<f64> {
        match self.terms.len() {
            0 => Some(0.0),
            1 => self
                .terms
                .iter()
                .next()
                .filter(|(m, _)| m.is_empty())
                .map(|(_, c)| c.0),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.as_constant().is_some()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    fn single_term(&self) -> Option<(&Monomial, f64)> {
        if self.terms.len() == 1 {
            self.terms.iter().next().map(|(m, c)| (m, c.0))
        } else {
            None
        }
    }

    /// Single term over plain symbols only; such terms have an exact inverse.
    pub fn is_symbol_monomial(&self) -> bool {
        self.single_term()
            .map_or(false, |(m, _)| m.keys().all(|atom| matches!(atom, Atom::Sym(_))))
    }

    pub fn add_ref(&self, rhs: &Expr) -> Expr {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.push_term(m.clone(), c.0);
        }
        out
    }

    pub fn sub_ref(&self, rhs: &Expr) -> Expr {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.push_term(m.clone(), -c.0);
        }
        out
    }

    pub fn neg_ref(&self) -> Expr {
        self.scale(-1.0)
    }

    pub fn scale(&self, factor: f64) -> Expr {
        if factor == 0.0 {
            return Expr::zero();
        }
        let mut out = Expr::zero();
        for (m, c) in &self.terms {
            out.push_term(m.clone(), c.0 * factor);
        }
        out
    }

    pub fn mul_ref(&self, rhs: &Expr) -> Expr {
        if self.is_zero() || rhs.is_zero() {
            return Expr::zero();
        }
        if let Some(e) = cancel_group(self, rhs) {
            return e;
        }
        if let Some(e) = cancel_group(rhs, self) {
            return e;
        }

        let mut out = Expr::zero();
        let mut deferred: Vec<Expr> = Vec::new();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &rhs.terms {
                let (m, extra) = mul_monomials(ma, mb);
                match extra {
                    None => out.push_term(m, ca.0 * cb.0),
                    Some(extra) => deferred.push(extra.mul_ref(&Expr::term(m, ca.0 * cb.0))),
                }
            }
        }
        for e in deferred {
            out = out.add_ref(&e);
        }
        out
    }

    /// Integer power. `0^-k` follows IEEE semantics and yields infinity.
    pub fn powi(&self, exp: i32) -> Expr {
        match exp {
            0 => return Expr::one(),
            1 => return self.clone(),
            _ => {}
        }
        if self.is_zero() {
            return if exp > 0 {
                Expr::zero()
            } else {
                Expr::num(f64::INFINITY)
            };
        }
        if let Some((m, c)) = self.single_term() {
            let mut out = Expr::num(c.powi(exp));
            for (atom, e) in m {
                out = out.mul_ref(&Expr::from_atom(atom.clone(), e * exp));
            }
            return out;
        }
        if exp > 0 {
            let mut out = self.clone();
            for _ in 1..exp {
                out = out.mul_ref(self);
            }
            out
        } else {
            let (lead, base) = self.group_base();
            Expr::num(lead.powi(exp)).mul_ref(&Expr::from_atom(Atom::Group(Box::new(base)), exp))
        }
    }

    pub fn checked_recip(&self) -> Option<Expr> {
        if self.is_zero() {
            None
        } else {
            Some(self.powi(-1))
        }
    }

    pub fn checked_div(&self, rhs: &Expr) -> Option<Expr> {
        rhs.checked_recip().map(|inv| self.mul_ref(&inv))
    }

    /// Split a sum into `lead * base` where `base` has leading coefficient 1.
    fn group_base(&self) -> (f64, Expr) {
        let lead = self.terms.values().next().map(|c| c.0).unwrap_or(1.0);
        (lead, self.scale(1.0 / lead))
    }

    /// Partial derivative with respect to `var`
    pub fn diff(&self, var: &Symbol) -> Expr {
        let mut out = Expr::zero();
        for (m, c) in &self.terms {
            for (atom, e) in m {
                let d_atom = atom.diff(var);
                if d_atom.is_zero() {
                    continue;
                }
                let mut rest = m.clone();
                rest.remove(atom);
                let outer = Expr::term(rest, c.0 * f64::from(*e))
                    .mul_ref(&Expr::from_atom(atom.clone(), e - 1));
                out = out.add_ref(&outer.mul_ref(&d_atom));
            }
        }
        out
    }

    /// Substitute symbols by expressions
    pub fn subs(&self, map: &HashMap<Symbol, Expr>) -> Expr {
        if map.is_empty() {
            return self.clone();
        }
        let mut out = Expr::zero();
        for (m, c) in &self.terms {
            let mut acc = Expr::num(c.0);
            for (atom, e) in m {
                acc = acc.mul_ref(&atom.subs(map).powi(*e));
            }
            out = out.add_ref(&acc);
        }
        out
    }

    /// Substitute symbols by numbers
    pub fn subs_values(&self, values: &BTreeMap<Symbol, f64>) -> Expr {
        let map: HashMap<Symbol, Expr> = values
            .iter()
            .map(|(s, v)| (s.clone(), Expr::num(*v)))
            .collect();
        self.subs(&map)
    }

    /// Numeric value once every free symbol is given
    pub fn eval(&self, values: &BTreeMap<Symbol, f64>) -> Option<f64> {
        self.subs_values(values).as_constant()
    }

    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        for m in self.terms.keys() {
            for atom in m.keys() {
                atom.collect_symbols(out);
            }
        }
    }

    /// Polynomial numerator: the expression times the product of every
    /// atom it carries with a negative exponent.
    pub fn numerator(&self) -> Expr {
        clear_denominators(std::slice::from_ref(self))
            .pop()
            .unwrap_or_default()
    }

    /// Exact zero test, also for rational expressions whose map form is not
    /// unique.
    pub fn is_identically_zero(&self) -> bool {
        self.is_zero() || self.numerator().is_zero()
    }

    /// Largest inverse power of each atom over all terms
    fn collect_denominators(&self, out: &mut BTreeMap<Atom, i32>) {
        for m in self.terms.keys() {
            for (atom, &e) in m {
                if e < 0 {
                    let k = out.entry(atom.clone()).or_insert(0);
                    *k = (*k).max(-e);
                }
            }
        }
    }

    /// Multiply by `Π atom^k`. Raised powers are rebuilt with `from_atom`,
    /// so inverted sums expand and the sqrt and cos reductions apply.
    fn clear(&self, denominators: &BTreeMap<Atom, i32>) -> Expr {
        let mut out = Expr::zero();
        for (m, c) in &self.terms {
            let mut rest = m.clone();
            let mut acc = Expr::one();
            for (atom, k) in denominators {
                let e = rest.remove(atom).unwrap_or(0) + k;
                acc = acc.mul_ref(&Expr::from_atom(atom.clone(), e));
            }
            out = out.add_ref(&acc.mul_ref(&Expr::term(rest, c.0)));
        }
        out
    }
}

/// Scale every entry by one common nonzero factor so that no atom keeps a
/// negative exponent. Ratios between entries are preserved.
pub fn clear_denominators(exprs: &[Expr]) -> Vec<Expr> {
    let mut out = exprs.to_vec();
    for _ in 0..MAX_CLEAR_PASSES {
        let mut denominators = BTreeMap::new();
        for e in &out {
            e.collect_denominators(&mut denominators);
        }
        if denominators.is_empty() {
            break;
        }
        out = out.iter().map(|e| e.clear(&denominators)).collect();
    }
    out
}

/// `sum * other` when every term of `other` carries `sum^-k`; the group
/// exponent moves one step towards zero instead of expanding.
fn cancel_group(sum: &Expr, other: &Expr) -> Option<Expr> {
    if sum.terms.len() < 2 {
        return None;
    }
    let (lead, base) = sum.group_base();
    let atom = Atom::Group(Box::new(base));
    if !other
        .terms
        .keys()
        .all(|m| m.get(&atom).map_or(false, |e| *e < 0))
    {
        return None;
    }
    let mut out = Expr::zero();
    for (m, c) in &other.terms {
        let mut m = m.clone();
        if let Some(e) = m.get_mut(&atom) {
            *e += 1;
            if *e == 0 {
                m.remove(&atom);
            }
        }
        out.push_term(m, c.0 * lead);
    }
    Some(out)
}

fn mul_monomials(a: &Monomial, b: &Monomial) -> (Monomial, Option<Expr>) {
    let mut m = a.clone();
    for (atom, e) in b {
        *m.entry(atom.clone()).or_insert(0) += e;
    }
    m.retain(|_, e| *e != 0);

    let reducible: Vec<Atom> = m
        .iter()
        .filter(|(atom, e)| atom.is_reducible(**e))
        .map(|(atom, _)| atom.clone())
        .collect();
    if reducible.is_empty() {
        return (m, None);
    }
    let mut extra = Expr::one();
    for atom in reducible {
        if let Some(e) = m.remove(&atom) {
            extra = extra.mul_ref(&Expr::from_atom(atom, e));
        }
    }
    (m, Some(extra))
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Atom::Sym(s) => write!(f, "{}", s),
            Atom::Func(func, arg) => write!(f, "{}({})", func.name(), arg),
            Atom::Group(base) => write!(f, "({})", base),
        }
    }
}

fn fmt_term(f: &mut fmt::Formatter, m: &Monomial, c: f64, first: bool) -> fmt::Result {
    let sign = match (first, c < 0.0) {
        (true, true) => "-",
        (true, false) => "",
        (false, true) => " - ",
        (false, false) => " + ",
    };
    f.write_str(sign)?;
    let a = c.abs();
    if m.is_empty() {
        return write!(f, "{}", a);
    }
    if a != 1.0 {
        write!(f, "{}*", a)?;
    }
    for (i, (atom, e)) in m.iter().enumerate() {
        if i > 0 {
            f.write_str("*")?;
        }
        if *e == 1 {
            write!(f, "{}", atom)?;
        } else {
            write!(f, "{}^{}", atom, e)?;
        }
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("0");
        }
        // symbolic terms first, constant last
        let mut first = true;
        for (m, c) in self.terms.iter().filter(|(m, _)| !m.is_empty()) {
            fmt_term(f, m, c.0, first)?;
            first = false;
        }
        if let Some(c) = self.terms.get(&Monomial::new()) {
            fmt_term(f, &Monomial::new(), c.0, first)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Expr({})", self)
    }
}

impl From<Expr> for String {
    fn from(e: Expr) -> String {
        e.to_string()
    }
}

impl TryFrom<String> for Expr {
    type Error = ParseError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Expr::parse(&text)
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::num(v)
    }
}

impl From<&Symbol> for Expr {
    fn from(s: &Symbol) -> Self {
        Expr::from_symbol(s)
    }
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $inner:ident) => {
        impl $trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                self.$inner(rhs)
            }
        }

        impl $trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                self.$inner(&rhs)
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                self.$inner(rhs)
            }
        }

        impl $trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                self.$inner(&rhs)
            }
        }
    };
}

impl_binop!(Add, add, add_ref);
impl_binop!(Sub, sub, sub_ref);
impl_binop!(Mul, mul, mul_ref);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self.neg_ref()
    }
}

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self.neg_ref()
    }
}
