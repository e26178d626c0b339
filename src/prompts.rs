//! Extraction prompts sent alongside every page.
//!
//! Centralising the wording here keeps the pipeline free of prompt text and
//! lets unit tests assert on the contract without calling a model. The
//! contract is advisory: nothing downstream assumes the model honoured it.
//!
//! Callers can override the built-in templates via
//! [`crate::config::ExtractionConfig::prompt_template`].

use crate::config::PromptVersion;

/// Full extraction contract, including the reserved metadata line.
pub const PROMPT_V2: &str = r#"Extract ALL tabular data from this {document_type}{page_info} and return it as CSV. Also identify the collection date and the station code if the document shows them.

1. METADATA LINE
   - The FIRST line of your answer must be: #METADATA:<YYYY-MM>;<STATION>
   - <YYYY-MM> is the collection date, <STATION> is the station code
   - Leave a field blank when it is not shown, but ALWAYS keep the semicolon
   - Examples: #METADATA:2020-08;123   #METADATA:2020-08;   #METADATA:;123   #METADATA:;

2. TABLE
   - After the metadata line, output exactly one header row, then the data rows
   - If there are several tables, use the largest/main one
   - Copy the header exactly as shown, including units (e.g. "Value in mg/L")
   - Extract EVERY row; do not summarise, compute or reorder anything
   - Preserve numbers and dates exactly as they appear

3. COLUMN ALIGNMENT
   - Fields are separated by commas, one row per line
   - Every data row has exactly as many fields as the header row
   - A missing value is an empty field (two adjacent commas); never shift
     neighbouring values to fill the gap
   - A merged or spanning cell repeats its value in every column it spans

4. QUOTING
   - Enclose text fields in double quotes
   - Double any double quote inside a field ("" for ")

5. UNREADABLE VALUES
   - Write ??? for a value that cannot be read at all
   - Write ? for each unclear character, e.g. 12?.?5

6. OUTPUT FORMAT
   - Output ONLY the metadata line and the CSV
   - Do NOT wrap the answer in ``` fences
   - Do NOT add commentary

Example:
#METADATA:2020-08;123
"Station","Date","pH","Value in mg/L"
"North",2020-08-01,7.1,
"North",2020-08-02,???,12?.5"#;

/// Legacy table-only wording without the metadata line.
pub const PROMPT_V1: &str = r#"Extract ALL tabular data from this {document_type}{page_info} and return it as CSV.

- Output one header row followed by every data row of the main table
- Separate fields with commas, one row per line
- Every row has as many fields as the header; leave missing values empty
- Repeat the value of merged cells in every column they span
- Enclose text fields in double quotes and double embedded quotes
- Write ??? for unreadable values and ? for unclear characters
- Output ONLY the CSV, without ``` fences or commentary"#;

/// Build the instruction text for one document or page.
///
/// `document_type` is a label such as `"PDF"` or `"JPG"`. A `None` or empty
/// `page_label` omits the ` (page N)` suffix.
pub fn build_prompt(document_type: &str, page_label: Option<&str>) -> String {
    build_prompt_with(PromptVersion::default(), None, document_type, page_label)
}

/// Build the instruction text from a specific version or a custom template.
pub fn build_prompt_with(
    version: PromptVersion,
    template: Option<&str>,
    document_type: &str,
    page_label: Option<&str>,
) -> String {
    let template = template.unwrap_or(match version {
        PromptVersion::V1 => PROMPT_V1,
        PromptVersion::V2 => PROMPT_V2,
    });
    let page_info = match page_label.map(str::trim) {
        Some(label) if !label.is_empty() => format!(" (page {label})"),
        _ => String::new(),
    };
    template
        .replace("{document_type}", document_type)
        .replace("{page_info}", &page_info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_label_adds_suffix() {
        let p = build_prompt("PDF", Some("3"));
        assert!(p.starts_with("Extract ALL tabular data from this PDF (page 3) and"));
    }

    #[test]
    fn empty_page_label_is_omitted() {
        let with_empty = build_prompt("JPG", Some(""));
        let without = build_prompt("JPG", None);
        assert_eq!(with_empty, without);
        assert!(without.contains("from this JPG and"));
        assert!(!without.contains("(page"));
    }

    #[test]
    fn v2_carries_metadata_contract() {
        let p = build_prompt("PDF", None);
        assert!(p.contains("#METADATA:<YYYY-MM>;<STATION>"));
        assert!(p.contains("#METADATA:;"));
        assert!(p.contains("???"));
        assert!(p.contains("double quotes"));
        assert!(p.contains("spans"));
    }

    #[test]
    fn v1_has_no_metadata_line() {
        let p = build_prompt_with(PromptVersion::V1, None, "PDF", Some("1"));
        assert!(!p.contains("#METADATA"));
        assert!(p.contains("(page 1)"));
    }

    #[test]
    fn custom_template_substitutes_placeholders() {
        let p = build_prompt_with(
            PromptVersion::V2,
            Some("Read the {document_type}{page_info}."),
            "PDF",
            Some("2"),
        );
        assert_eq!(p, "Read the PDF (page 2).");
    }

    #[test]
    fn prompt_is_pure() {
        assert_eq!(build_prompt("PDF", Some("7")), build_prompt("PDF", Some("7")));
    }
}
