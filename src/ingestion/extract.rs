//! Text extraction (spec §4.1 step 3): a pure helper turning raw bytes of
//! one of the four supported file types into a single UTF-8 string.

use crate::domain::FileType;
use crate::error::{AppError, Result};

pub fn extract_text(bytes: &[u8], file_type: FileType) -> Result<String> {
    match file_type {
        FileType::Pdf => extract_pdf(bytes),
        FileType::Docx => extract_docx(bytes),
        FileType::Txt | FileType::Md => Ok(decode_lossy(bytes)),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| AppError::UnprocessableDocument(format!("PDF parse failed: {e}")))?;

    if pages.is_empty() {
        return Err(AppError::UnprocessableDocument("PDF has no pages".to_string()));
    }
    if pages.iter().all(|p| p.trim().is_empty()) {
        return Err(AppError::UnprocessableDocument("PDF has no extractable text".to_string()));
    }

    let mut text = String::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            text.push_str("\n\n");
        }
        text.push_str(&format!("--- Page {} ---\n", i + 1));
        text.push_str(page);
    }
    Ok(text)
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| AppError::UnprocessableDocument(format!("DOCX parse failed: {e}")))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut text = String::new();
            for run_child in &paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = run_child {
                    for run_content in &run.children {
                        if let docx_rs::RunChild::Text(t) = run_content {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            if !text.trim().is_empty() {
                paragraphs.push(text);
            }
        }
    }

    Ok(paragraphs.join("\n\n"))
}

fn decode_lossy(bytes: &[u8]) -> String {
    let (decoded, _, _) = encoding_rs::UTF_8.decode(bytes);
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_txt_replacing_invalid_sequences() {
        let bytes = b"hello \xFF world";
        let text = decode_lossy(bytes);
        assert!(text.contains("hello"));
        assert!(text.contains("world"));
    }
}
