use chrono::{DateTime, Local};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{NoaError, NoaResult};
use crate::model::NoaModel;

const GZIP_EXT: &str = "gz";

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl NoaModel {
    /// `<dir>/<name>_<order>OrderLD_<policy>_<timestamp>`
    pub fn backup_base_name(&self, dir: &Path, now: DateTime<Local>) -> PathBuf {
        dir.join(format!(
            "{}_{}OrderLD_{}_{}",
            self.name,
            self.final_order,
            self.active_policy,
            now.format("%Y-%m-%d_%H-%M-%S")
        ))
    }

    /// Write the snapshot as `<base>.json` and `<base>.json.gz`, creating
    /// `dir` if needed. Returns the base name.
    pub fn save(&mut self, dir: impl AsRef<Path>) -> NoaResult<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| NoaError::io(dir, e))?;

        let base = self.backup_base_name(dir, Local::now());
        self.backup_name = Some(base.clone());

        let json = serde_json::to_string_pretty(self).map_err(|e| NoaError::json(&base, e))?;

        let plain_path = with_suffix(&base, ".json");
        fs::write(&plain_path, &json).map_err(|e| NoaError::io(&plain_path, e))?;

        // Compress with gzip
        let gz_path = with_suffix(&base, ".json.gz");
        let file = File::create(&gz_path).map_err(|e| NoaError::io(&gz_path, e))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder
            .write_all(json.as_bytes())
            .map_err(|e| NoaError::io(&gz_path, e))?;
        encoder.finish().map_err(|e| NoaError::io(&gz_path, e))?;

        log::info!("[SAVE] snapshot written to {}.json(.gz)", base.display());
        Ok(base)
    }

    /// Restore a snapshot written by [`NoaModel::save`]; gzip when the
    /// extension is `.gz`, plain JSON otherwise.
    pub fn load(path: impl AsRef<Path>) -> NoaResult<NoaModel> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| NoaError::io(path, e))?;

        let mut json = String::new();
        if path.extension().map_or(false, |ext| ext == GZIP_EXT) {
            GzDecoder::new(file)
                .read_to_string(&mut json)
                .map_err(|e| NoaError::io(path, e))?;
        } else {
            BufReader::new(file)
                .read_to_string(&mut json)
                .map_err(|e| NoaError::io(path, e))?;
        }

        let model: NoaModel = serde_json::from_str(&json).map_err(|e| NoaError::json(path, e))?;
        log::info!("[LOAD] {} restored from {}", model.name, path.display());
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ControlAffineSystem;
    use crate::symbolic::{symbols, Expr};
    use chrono::TimeZone;

    fn analyzed_model() -> NoaModel {
        let p = |t: &str| Expr::parse(t).unwrap();
        let sys = ControlAffineSystem::new(
            symbols(&["x1", "x2"]),
            vec![vec![p("0"), p("0")], vec![p("1"), p("0")]],
            vec![p("x1")],
        );
        let mut model = NoaModel::new("no_drift", sys);
        model.orc().unwrap();
        model.observable_mode().unwrap();
        model
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("noa_rs_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_backup_name_format() {
        let model = analyzed_model();
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let base = model.backup_base_name(Path::new("out"), now);
        assert_eq!(
            base,
            PathBuf::from("out/no_drift_2OrderLD_permutation_2024-03-05_14-07-09")
        );
    }

    #[test]
    fn test_save_and_load_both_forms() {
        let dir = scratch_dir("save");
        let mut model = analyzed_model();
        let base = model.save(&dir).unwrap();
        assert!(dir.exists());

        for suffix in [".json", ".json.gz"] {
            let restored = NoaModel::load(with_suffix(&base, suffix)).unwrap();
            assert_eq!(restored.name, model.name);
            assert_eq!(restored.system, model.system);
            assert_eq!(restored.obsv_mat, model.obsv_mat);
            assert_eq!(restored.lie, model.lie);
            assert_eq!(restored.rank, model.rank);
            assert_eq!(restored.symmetries, model.symmetries);
            assert_eq!(restored.decomposition, model.decomposition);
            assert_eq!(restored.trace, model.trace);
            assert_eq!(restored.backup_name, Some(base.clone()));
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_file() {
        let err = NoaModel::load("/nonexistent/noa_rs/model.json").unwrap_err();
        assert!(matches!(err, NoaError::Io { .. }));
    }
}
