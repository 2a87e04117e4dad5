use std::path::Path;

use crate::intake::*;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum InputType {
    Csv,
    Json,
    Xlsx,
}

impl InputType {
    pub fn parse(s: &str) -> IntakeResult<InputType> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(InputType::Csv),
            "json" => Ok(InputType::Json),
            "xlsx" | "excel" => Ok(InputType::Xlsx),
            _ => UnknownInputTypeSnafu { input_type: s }.fail(),
        }
    }

    /// Guesses the input type from the extension of the file.
    pub fn infer(path: &str) -> IntakeResult<InputType> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        InputType::parse(ext)
    }

    pub fn name(&self) -> &'static str {
        match self {
            InputType::Csv => "csv",
            InputType::Json => "json",
            InputType::Xlsx => "xlsx",
        }
    }
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_types() {
        assert_eq!(InputType::infer("a/b/cases.XLSX").unwrap(), InputType::Xlsx);
        assert_eq!(InputType::parse(" JSON ").unwrap(), InputType::Json);
        assert!(InputType::infer("cases").is_err());
        assert!(InputType::parse("dominion").is_err());
    }

    #[test]
    fn file_names() {
        assert_eq!(simplify_file_name("/tmp/data/cases.csv"), "cases.csv");
        assert_eq!(simplify_file_name("cases.csv"), "cases.csv");
    }
}
