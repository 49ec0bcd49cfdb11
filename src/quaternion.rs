//! Symbolic quaternion helpers for building attitude models
//!
//! Quaternions are scalar-first `[qw, qx, qy, qz]`.

use nalgebra::Quaternion;
use std::collections::BTreeMap;

use crate::symbolic::{Expr, SymMatrix, Symbol};

/// Rotation matrix of a (unit) quaternion; accepts symbolic entries
pub fn quat2rotm_sym(q: &[Expr; 4]) -> SymMatrix {
    let [qw, qx, qy, qz] = q;
    let two = |e: Expr| e.scale(2.0);

    let sq = |e: &Expr| e * e;
    let (ww, xx, yy, zz) = (sq(qw), sq(qx), sq(qy), sq(qz));

    let r00 = &ww + &xx - &yy - &zz;
    let r01 = two(qx * qy - qw * qz);
    let r02 = two(qx * qz + qw * qy);

    let r10 = two(qx * qy + qw * qz);
    let r11 = &ww - &xx + &yy - &zz;
    let r12 = two(qy * qz - qw * qx);

    let r20 = two(qx * qz - qw * qy);
    let r21 = two(qy * qz + qw * qx);
    let r22 = ww - xx - yy + zz;

    SymMatrix::from_rows(
        vec![
            vec![r00, r01, r02],
            vec![r10, r11, r12],
            vec![r20, r21, r22],
        ],
        3,
    )
}

/// Hamilton product `q ⊗ r`
pub fn quatprod_sym(q: &[Expr; 4], r: &[Expr; 4]) -> [Expr; 4] {
    let [q0, q1, q2, q3] = q;
    let [r0, r1, r2, r3] = r;
    [
        r0 * q0 - r1 * q1 - r2 * q2 - r3 * q3,
        r0 * q1 + r1 * q0 - r2 * q3 + r3 * q2,
        r0 * q2 + r1 * q3 + r2 * q0 - r3 * q1,
        r0 * q3 - r1 * q2 + r2 * q1 + r3 * q0,
    ]
}

/// Substitution map binding quaternion symbols to a numeric quaternion
pub fn quatsub_sym(q_syms: &[Symbol; 4], q: &Quaternion<f64>) -> BTreeMap<Symbol, f64> {
    let values = [q.w, q.i, q.j, q.k];
    q_syms.iter().cloned().zip(values).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::symbols;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    fn quat_syms() -> [Symbol; 4] {
        let s = symbols(&["qw", "qx", "qy", "qz"]);
        [s[0].clone(), s[1].clone(), s[2].clone(), s[3].clone()]
    }

    fn quat_exprs(syms: &[Symbol; 4]) -> [Expr; 4] {
        [
            Expr::from_symbol(&syms[0]),
            Expr::from_symbol(&syms[1]),
            Expr::from_symbol(&syms[2]),
            Expr::from_symbol(&syms[3]),
        ]
    }

    #[test]
    fn test_rotation_matrix_matches_nalgebra() {
        let syms = quat_syms();
        let r_sym = quat2rotm_sym(&quat_exprs(&syms));

        let unit = UnitQuaternion::from_axis_angle(
            &nalgebra::Unit::new_normalize(Vector3::new(0.3, -1.0, 0.5)),
            0.8,
        );
        let values = quatsub_sym(&syms, unit.quaternion());
        let expected = unit.to_rotation_matrix();

        for i in 0..3 {
            for j in 0..3 {
                let entry = r_sym.get(i, j).eval(&values).unwrap();
                assert_relative_eq!(entry, expected[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_identity_quaternion() {
        let q = [Expr::one(), Expr::zero(), Expr::zero(), Expr::zero()];
        let r = quat2rotm_sym(&q);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_eq!(r.get(i, j).as_constant(), Some(expected));
            }
        }
    }

    #[test]
    fn test_product_matches_nalgebra() {
        let q_syms = quat_syms();
        let r_syms: [Symbol; 4] = {
            let s = symbols(&["rw", "rx", "ry", "rz"]);
            [s[0].clone(), s[1].clone(), s[2].clone(), s[3].clone()]
        };
        let n = quatprod_sym(&quat_exprs(&q_syms), &quat_exprs(&r_syms));

        let q = Quaternion::new(0.5, -0.1, 0.7, 0.2);
        let r = Quaternion::new(-0.3, 0.4, 0.1, 0.9);
        let mut values = quatsub_sym(&q_syms, &q);
        values.extend(quatsub_sym(&r_syms, &r));

        let expected = q * r;
        let got: Vec<f64> = n.iter().map(|e| e.eval(&values).unwrap()).collect();
        assert_relative_eq!(got[0], expected.w, epsilon = 1e-12);
        assert_relative_eq!(got[1], expected.i, epsilon = 1e-12);
        assert_relative_eq!(got[2], expected.j, epsilon = 1e-12);
        assert_relative_eq!(got[3], expected.k, epsilon = 1e-12);
    }

    #[test]
    fn test_substitution_map() {
        let syms = quat_syms();
        let values = quatsub_sym(&syms, &Quaternion::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(values[&Symbol::new("qw")], 1.0);
        assert_eq!(values[&Symbol::new("qz")], 4.0);
    }
}
