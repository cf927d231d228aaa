//! Building image uploads from files

use std::path::Path;

use crate::types::ImageUpload;

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    ///
    /// Unknown extensions are sent as `application/octet-stream`; the server
    /// decides whether the content is an acceptable image.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = guess_content_type(path);

        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_from_path_guesses_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Leaf.JPG");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0xff, 0xd8, 0xff])
            .unwrap();

        let upload = ImageUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name, "Leaf.JPG");
        assert_eq!(upload.content_type, "image/jpeg");
        assert_eq!(upload.bytes, vec![0xff, 0xd8, 0xff]);
        assert!(upload.is_image());
    }

    #[tokio::test]
    async fn test_from_path_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.notanimage");
        std::fs::write(&path, b"not an image").unwrap();

        let upload = ImageUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.content_type, "application/octet-stream");
        assert!(!upload.is_image());
    }

    #[tokio::test]
    async fn test_from_path_less_common_image_types() {
        let dir = tempfile::tempdir().unwrap();
        for (name, expected) in [("scan.tiff", "image/tiff"), ("leaf.svg", "image/svg+xml")] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"\x00\x01").unwrap();

            let upload = ImageUpload::from_path(&path).await.unwrap();
            assert_eq!(upload.content_type, expected);
            assert!(upload.is_image());
        }
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        assert!(ImageUpload::from_path("/nonexistent/leaf.png").await.is_err());
    }
}
