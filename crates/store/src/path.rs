//! Logical path handling.
//!
//! Store paths look like `/{root}/{datasource}/{subpath}.{ext}` where the
//! extension is one of BAND, IMAGE, TIF, TIFF (case insensitive). Band style
//! extensions are normalised to `.BAND`, images keep `.IMAGE`.

use crate::{Error, Result};

pub const PATH_ROOT: &str = "edm_store";

const ILLEGAL_CHARS: [char; 4] = ['.', '?', '=', ' '];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Band,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalPath {
    pub datasource: String,
    pub subpath: String,
    pub kind: PathKind,
}

impl LogicalPath {
    /// The normalised string form, `/{root}/{datasource}/{subpath}.BAND` or `.IMAGE`.
    pub fn to_path(&self) -> String {
        let ext = match self.kind {
            PathKind::Band => "BAND",
            PathKind::Image => "IMAGE",
        };
        format!("/{PATH_ROOT}/{}/{}.{ext}", self.datasource, self.subpath)
    }
}

/// Normalise separators, windows style backslashes become forward slashes.
pub fn rebuild_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Parse and validate a logical path.
pub fn parse(path: &str) -> Result<LogicalPath> {
    let rebuilt = rebuild_separators(path);

    let illegal = || Error::Path(format!("Illegal path: {path}"));

    let rest = rebuilt.strip_prefix(&format!("/{PATH_ROOT}/")).ok_or_else(illegal)?;
    let (datasource, subpath_ext) = rest.split_once('/').ok_or_else(illegal)?;
    let (subpath, ext) = subpath_ext.rsplit_once('.').ok_or_else(illegal)?;

    if datasource.is_empty() || subpath.is_empty() {
        return Err(illegal());
    }

    if datasource.contains(ILLEGAL_CHARS) || subpath.contains(ILLEGAL_CHARS) {
        return Err(illegal());
    }

    let kind = match ext.to_ascii_lowercase().as_str() {
        "band" | "tif" | "tiff" => PathKind::Band,
        "image" => PathKind::Image,
        _ => return Err(Error::Path(format!("Illegal path extension: {path}"))),
    };

    Ok(LogicalPath {
        datasource: datasource.to_string(),
        subpath: subpath.to_string(),
        kind,
    })
}

/// Parse, check the datasource against an allow list and return the
/// normalised path.
pub fn verify_and_rebuild(path: &str, allowed_datasources: &[String]) -> Result<String> {
    let parsed = parse(path)?;
    if !allowed_datasources.iter().any(|ds| ds == &parsed.datasource) {
        return Err(Error::Path(format!("Illegal path, datasource not allowed: {path}")));
    }

    Ok(parsed.to_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["test".to_string()]
    }

    #[test]
    fn tif_normalises_to_band() -> Result {
        assert_eq!(verify_and_rebuild("/edm_store/test/1.TIF", &allowed())?, "/edm_store/test/1.BAND");
        assert_eq!(verify_and_rebuild("/edm_store/test/1.tiff", &allowed())?, "/edm_store/test/1.BAND");
        assert_eq!(verify_and_rebuild("/edm_store/test/1.BAND", &allowed())?, "/edm_store/test/1.BAND");
        Ok(())
    }

    #[test]
    fn image_extension_is_kept() -> Result {
        let parsed = parse("/edm_store/test/scene-1.IMAGE")?;
        assert_eq!(parsed.kind, PathKind::Image);
        assert_eq!(parsed.to_path(), "/edm_store/test/scene-1.IMAGE");
        Ok(())
    }

    #[test]
    fn wrong_root_is_illegal() {
        let err = verify_and_rebuild("/edm/test/1.TIF", &allowed());
        assert!(matches!(err, Err(Error::Path(msg)) if msg.contains("Illegal path")));
    }

    #[test]
    fn disallowed_datasource_is_illegal() {
        let err = verify_and_rebuild("/edm_store/dataset/1.tif", &allowed());
        assert!(matches!(err, Err(Error::Path(msg)) if msg.contains("Illegal path")));

        let allowed = vec!["test".to_string(), "dataset".to_string()];
        assert_eq!(
            verify_and_rebuild("/edm_store/dataset/1.tif", &allowed).expect("allowed now"),
            "/edm_store/dataset/1.BAND"
        );
    }

    #[test]
    fn illegal_characters_are_rejected() {
        for path in [
            "/edm_store/test/a b.TIF",
            "/edm_store/test/a?b.TIF",
            "/edm_store/test/a=b.TIF",
            "/edm_store/test/a.b.TIF",
        ] {
            assert!(parse(path).is_err(), "{path} should be rejected");
        }
    }

    #[test]
    fn backslashes_are_normalised() {
        assert_eq!(rebuild_separators(r"/edm_store\test/1.TIF"), "/edm_store/test/1.TIF");
        let parsed = parse(r"/edm_store\test/1.TIF").expect("parses after rebuild");
        assert_eq!(parsed.datasource, "test");
    }

    #[test]
    fn bad_extension_is_rejected() {
        assert!(matches!(parse("/edm_store/test/1.png"), Err(Error::Path(_))));
    }
}
