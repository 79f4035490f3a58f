//! Plain-text extraction from uploaded files, dispatched on file extension.

use std::io::{Cursor, Read};

use quick_xml::{events::Event, Reader};
use zip::ZipArchive;

use common::error::AppError;

/// Extracts readable text from `bytes` based on `file_type` (a lowercase-able
/// extension without the dot). Returns `UnsupportedFormat` for extensions we
/// do not handle and `Extraction` when a supported file cannot be parsed or
/// contains no text.
pub fn extract_text(file_type: &str, bytes: &[u8]) -> Result<String, AppError> {
    let format = file_type.trim().trim_start_matches('.').to_lowercase();

    let text = match format.as_str() {
        "pdf" => extract_pdf(bytes)?,
        "doc" | "docx" => extract_docx(&format, bytes)?,
        "txt" => extract_txt(bytes)?,
        other => return Err(AppError::UnsupportedFormat(other.to_string())),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::extraction(format.as_str(), "document contains no text"));
    }

    Ok(trimmed.to_string())
}

fn extract_pdf(bytes: &[u8]) -> Result<String, AppError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|err| AppError::extraction("pdf", err.to_string()))
}

/// Word documents are zip archives; the body text lives in the `w:t` runs of
/// `word/document.xml`. Paragraph ends become newlines so sentence boundaries
/// survive into chunking.
fn extract_docx(format: &str, bytes: &[u8]) -> Result<String, AppError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| AppError::extraction(format, err.to_string()))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| AppError::extraction(format, err.to_string()))?
        .read_to_string(&mut document_xml)
        .map_err(|err| AppError::extraction(format, err.to_string()))?;

    let mut reader = Reader::from_str(&document_xml);
    reader.config_mut().trim_text(false);

    let mut text = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) if element.name().as_ref() == b"w:t" => {
                in_text_run = true;
            }
            Ok(Event::End(element)) => match element.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(content)) if in_text_run => {
                let unescaped = content
                    .unescape()
                    .map_err(|err| AppError::extraction(format, err.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(AppError::extraction(format, err.to_string())),
        }
    }

    Ok(text)
}

fn extract_txt(bytes: &[u8]) -> Result<String, AppError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|err| AppError::extraction("txt", err.to_string()))
}
