//! Application scaffolds written by the `CreateApp` action.
//!
//! Templates are pure: they turn validated parameters into file contents.
//! Writing those bytes to disk is the only side effect, done by [`write_files`].

use crate::error::{DispatchError, Result};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldFile {
    /// Path relative to the scaffold directory.
    pub path: PathBuf,
    pub content: Vec<u8>,
}

impl ScaffoldFile {
    fn new(path: &str, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: PathBuf::from(path),
            content: content.into(),
        }
    }
}

/// Renders the files for a generated application.
pub trait ScaffoldTemplate: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, message: &str, port: u16) -> Vec<ScaffoldFile>;
}

// ---------------------------------------------------------------------------
// FlaskTemplate
// ---------------------------------------------------------------------------

/// Minimal Flask app served from `python:3.11-slim`, exposing port 5000.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlaskTemplate;

const FLASK_REQUIREMENTS: &str = "flask==2.3.2\n";

const FLASK_DOCKERFILE: &str = "\
FROM python:3.11-slim
WORKDIR /app
COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt
COPY app.py .
EXPOSE 5000
CMD [\"python\", \"app.py\"]
";

impl ScaffoldTemplate for FlaskTemplate {
    fn name(&self) -> &str {
        "flask"
    }

    fn render(&self, message: &str, port: u16) -> Vec<ScaffoldFile> {
        let app = format!(
            "from flask import Flask\n\
             app = Flask(__name__)\n\
             \n\
             @app.route(\"/\")\n\
             def home():\n    \
                 return \"\"\"{message}\"\"\"\n\
             \n\
             if __name__ == \"__main__\":\n    \
                 app.run(host=\"0.0.0.0\", port={port})\n"
        );
        vec![
            ScaffoldFile::new("app.py", app),
            ScaffoldFile::new("requirements.txt", FLASK_REQUIREMENTS),
            ScaffoldFile::new("Dockerfile", FLASK_DOCKERFILE),
        ]
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write rendered files under `dir`, each atomically. Returns the written paths.
///
/// Paths that are absolute or climb out of `dir` are refused before
/// anything is written.
pub fn write_files(dir: &Path, files: &[ScaffoldFile]) -> Result<Vec<PathBuf>> {
    for file in files {
        let contained = file
            .path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained || file.path.as_os_str().is_empty() {
            return Err(DispatchError::ConstraintViolation {
                param: "path".to_string(),
                reason: format!("scaffold path {} escapes the target directory", file.path.display()),
            });
        }
    }

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let target = dir.join(&file.path);
        crate::io::atomic_write(&target, &file.content)?;
        written.push(target);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn flask_renders_three_files() {
        let files = FlaskTemplate.render("Hi there", 8000);
        let names: Vec<_> = files.iter().map(|f| f.path.to_str().unwrap()).collect();
        assert_eq!(names, ["app.py", "requirements.txt", "Dockerfile"]);

        let app = String::from_utf8(files[0].content.clone()).unwrap();
        assert!(app.contains("return \"\"\"Hi there\"\"\""));
        assert!(app.contains("port=8000"));
        assert!(app.contains("    app.run("));

        let dockerfile = String::from_utf8(files[2].content.clone()).unwrap();
        assert!(dockerfile.starts_with("FROM python:3.11-slim\n"));
        assert!(dockerfile.contains("EXPOSE 5000"));
    }

    #[test]
    fn write_files_lands_in_dir() {
        let dir = TempDir::new().unwrap();
        let written = write_files(dir.path(), &FlaskTemplate.render("x", 5000)).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("requirements.txt")).unwrap(),
            "flask==2.3.2\n"
        );
    }

    #[test]
    fn write_files_refuses_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            ScaffoldFile::new("ok.txt", "fine"),
            ScaffoldFile::new("../escape.txt", "nope"),
        ];
        assert!(write_files(dir.path(), &files).is_err());
        // nothing is written when any path is bad
        assert!(!dir.path().join("ok.txt").exists());
    }
}
