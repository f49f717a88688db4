pub mod logger;

/// Utility functions for the application
pub struct Utils;

impl Utils {
    /// Sanitize filename by replacing characters that are invalid in file names.
    ///
    /// Pure and idempotent: running it twice yields the same string.
    pub fn sanitize_filename(filename: &str) -> String {
        filename
            .chars()
            .map(|c| match c {
                '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
                _ => c,
            })
            .collect::<String>()
            .trim()
            .to_string()
    }
}
