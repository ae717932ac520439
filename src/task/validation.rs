//! Submission checks. A rejected submission never creates a task.

use thiserror::Error;

use crate::config::{SUPPORTED_FILE_EXTENSIONS, SUPPORTED_LANGUAGES, SUPPORTED_MODEL_SIZES};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No file provided")]
    MissingFile,
    #[error("Unsupported file type. Supported formats: {}", SUPPORTED_FILE_EXTENSIONS.join(", "))]
    UnsupportedFileType,
    #[error("File size exceeds maximum limit of {}MB", .max_bytes / (1024 * 1024))]
    FileTooLarge { size: u64, max_bytes: u64 },
    #[error("Language parameter is required")]
    MissingLanguage,
    #[error("Unsupported language '{0}'. Supported languages: {}", SUPPORTED_LANGUAGES.join(", "))]
    UnsupportedLanguage(String),
    #[error("Unsupported model size '{0}'. Supported sizes: {}", SUPPORTED_MODEL_SIZES.join(", "))]
    UnsupportedModelSize(String),
}

pub fn is_supported_file_type(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    SUPPORTED_FILE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext))
}

pub fn validate_file(file_name: &str, size: u64, max_bytes: u64) -> Result<(), ValidationError> {
    if file_name.trim().is_empty() {
        return Err(ValidationError::MissingFile);
    }
    if !is_supported_file_type(file_name) {
        return Err(ValidationError::UnsupportedFileType);
    }
    if size > max_bytes {
        return Err(ValidationError::FileTooLarge { size, max_bytes });
    }
    Ok(())
}

pub fn validate_language_and_model(language: &str, model_size: &str) -> Result<(), ValidationError> {
    if language.is_empty() {
        return Err(ValidationError::MissingLanguage);
    }
    if !SUPPORTED_LANGUAGES.contains(&language) {
        return Err(ValidationError::UnsupportedLanguage(language.to_string()));
    }
    if !SUPPORTED_MODEL_SIZES.contains(&model_size) {
        return Err(ValidationError::UnsupportedModelSize(model_size.to_string()));
    }
    Ok(())
}

/// Reduce an uploaded file name to a safe single path component
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_file_type_is_case_insensitive() {
        assert!(is_supported_file_type("talk.MP3"));
        assert!(is_supported_file_type("clip.mov"));
        assert!(!is_supported_file_type("notes.txt"));
        assert!(!is_supported_file_type("wav"));
    }

    #[test]
    fn test_validate_file() {
        assert_eq!(validate_file("", 1, MB), Err(ValidationError::MissingFile));
        assert_eq!(
            validate_file("a.flac", 1, MB),
            Err(ValidationError::UnsupportedFileType)
        );
        assert!(validate_file("a.wav", MB, MB).is_ok());

        let err = validate_file("a.wav", 100 * MB + 1, 100 * MB).unwrap_err();
        assert_eq!(err.to_string(), "File size exceeds maximum limit of 100MB");
    }

    #[test]
    fn test_validate_language_and_model() {
        assert!(validate_language_and_model("ja", "large").is_ok());
        assert_eq!(
            validate_language_and_model("", "small"),
            Err(ValidationError::MissingLanguage)
        );
        assert_eq!(
            validate_language_and_model("fr", "small").unwrap_err().to_string(),
            "Unsupported language 'fr'. Supported languages: zh, en, ja"
        );
        assert_eq!(
            validate_language_and_model("en", "medium").unwrap_err().to_string(),
            "Unsupported model size 'medium'. Supported sizes: small, large"
        );
    }

    #[test]
    fn test_unsupported_type_message_lists_formats() {
        assert_eq!(
            ValidationError::UnsupportedFileType.to_string(),
            "Unsupported file type. Supported formats: .wav, .mp3, .mp4, .mov"
        );
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd.wav"), "passwd.wav");
        assert_eq!(sanitize_file_name("C:\\tmp\\my talk.mp3"), "my_talk.mp3");
        assert_eq!(sanitize_file_name(".hidden.wav"), "hidden.wav");
        assert_eq!(sanitize_file_name(".."), "upload");
    }
}
