// 上传内容定义

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 文件分类（存储记录的 type 字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Code,
    Document,
    Image,
    Video,
    #[serde(other)]
    Other,
}

impl FileCategory {
    const CODE: &'static [&'static str] =
        &["ino", "cpp", "c", "h", "py", "js", "java", "html", "css", "json"];
    const DOCUMENT: &'static [&'static str] = &["docx", "pdf", "txt", "rtf", "doc", "odt"];
    const IMAGE: &'static [&'static str] = &["jpg", "jpeg", "png", "gif", "bmp", "svg"];
    const VIDEO: &'static [&'static str] = &["mp4", "avi", "mov", "mkv", "webm"];

    /// 按扩展名分类
    pub fn from_file_name(name: &str) -> Self {
        let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
        let ext = ext.as_str();
        if Self::CODE.contains(&ext) {
            FileCategory::Code
        } else if Self::DOCUMENT.contains(&ext) {
            FileCategory::Document
        } else if Self::IMAGE.contains(&ext) {
            FileCategory::Image
        } else if Self::VIDEO.contains(&ext) {
            FileCategory::Video
        } else {
            FileCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Code => "code",
            FileCategory::Document => "document",
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Other => "other",
        }
    }

    /// 展示用标签
    pub fn label(&self) -> &'static str {
        match self {
            FileCategory::Code => "Code File",
            FileCategory::Document => "Document",
            FileCategory::Image => "Image",
            FileCategory::Video => "Video",
            FileCategory::Other => "Other",
        }
    }
}

/// 根据扩展名推断 MIME 类型，未知类型返回 application/octet-stream
pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "txt" | "ino" | "h" | "c" | "cpp" | "py" | "java" => "text/plain",
        "html" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "rtf" => "application/rtf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// 内容来源
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// 已在内存中的字节
    Memory(Arc<[u8]>),
    /// 本地文件，上传时读取
    File(PathBuf),
}

/// 上传内容
#[derive(Debug, Clone)]
pub struct FilePayload {
    /// 文件名
    pub name: String,
    /// 字节长度
    pub size: u64,
    /// MIME 类型
    pub mime_type: String,
    /// 内容来源
    pub source: PayloadSource,
}

impl FilePayload {
    /// 内存内容
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let bytes: Vec<u8> = bytes.into();
        Self {
            mime_type: guess_mime_type(&name).to_string(),
            size: bytes.len() as u64,
            source: PayloadSource::Memory(Arc::from(bytes)),
            name,
        }
    }

    /// 本地文件（读取元数据，内容延迟到上传时读取）
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("不支持上传目录: {:?}", path),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        Ok(Self {
            mime_type: guess_mime_type(&name).to_string(),
            size: metadata.len(),
            source: PayloadSource::File(path.to_path_buf()),
            name,
        })
    }

    pub fn category(&self) -> FileCategory {
        FileCategory::from_file_name(&self.name)
    }

    /// 读取完整内容
    pub async fn read_bytes(&self) -> std::io::Result<Arc<[u8]>> {
        match &self.source {
            PayloadSource::Memory(bytes) => Ok(bytes.clone()),
            PayloadSource::File(path) => Ok(Arc::from(tokio::fs::read(path).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_category() {
        assert_eq!(FileCategory::from_file_name("main.CPP"), FileCategory::Code);
        assert_eq!(FileCategory::from_file_name("cv.pdf"), FileCategory::Document);
        assert_eq!(FileCategory::from_file_name("a.b.jpeg"), FileCategory::Image);
        assert_eq!(FileCategory::from_file_name("clip.webm"), FileCategory::Video);
        assert_eq!(FileCategory::from_file_name("Makefile"), FileCategory::Other);
        assert_eq!(FileCategory::Code.label(), "Code File");
    }

    #[test]
    fn test_from_bytes() {
        let payload = FilePayload::from_bytes("photo.png", vec![1u8, 2, 3]);
        assert_eq!(payload.size, 3);
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(payload.category(), FileCategory::Image);
    }

    #[tokio::test]
    async fn test_from_path() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(b"hello vault").unwrap();
        file.flush().unwrap();

        let payload = FilePayload::from_path(file.path()).await.unwrap();
        assert_eq!(payload.size, 11);
        assert_eq!(payload.mime_type, "text/plain");
        assert_eq!(&*payload.read_bytes().await.unwrap(), b"hello vault");
    }

    #[tokio::test]
    async fn test_from_path_rejects_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(FilePayload::from_path(dir.path()).await.is_err());
    }
}
