use std::fs;
use std::io;
use std::path::Path;

/// Writes `text` through a sibling temp file so readers never observe a
/// half-written document. The engine may scan the world folder while a
/// launch is being prepared.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("output");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp_path, text)?;

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(error);
        }
    }
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn write_creates_parents_and_replaces_existing() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("out.json");

        write_text_atomic(&path, "one").expect("first write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "one");

        write_text_atomic(&path, "two").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        // No temp file left behind.
        assert!(!path.with_file_name("out.json.tmp").exists());
    }
}
