use std::sync::Arc;

/// PDF 的 MIME 类型
pub const PDF_MIME: &str = "application/pdf";

const PDF_MAGIC: &[u8] = b"%PDF-";

/// 内存中的文档（基准文件或学生提交的文件）
///
/// 内容使用 `Arc<[u8]>` 持有，在并发评估之间共享时不复制。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
    /// 毫秒时间戳
    pub last_modified: i64,
}

impl Document {
    /// 创建文档，MIME 类型根据扩展名和内容推断
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>, last_modified: i64) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        let mime_type = sniff_mime(&name, &bytes).to_string();
        Self {
            name,
            mime_type,
            bytes,
            last_modified,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME
    }
}

/// 推断 MIME 类型：扩展名为 `.pdf` 或以 `%PDF-` 开头的内容视为 PDF
pub fn sniff_mime(name: &str, bytes: &[u8]) -> &'static str {
    let by_extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if by_extension || bytes.starts_with(PDF_MAGIC) {
        PDF_MIME
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_detected_by_extension_or_magic() {
        assert_eq!(sniff_mime("tarea.PDF", b""), PDF_MIME);
        assert_eq!(sniff_mime("tarea", b"%PDF-1.7\n"), PDF_MIME);
        assert_eq!(sniff_mime("tarea.docx", b"PK\x03\x04"), "application/octet-stream");
    }

    #[test]
    fn test_document_size() {
        let doc = Document::new("a.pdf", b"%PDF-1.4 hola".to_vec(), 0);
        assert!(doc.is_pdf());
        assert_eq!(doc.size(), 13);
    }
}
