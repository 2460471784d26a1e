//! System prompt assembly for the chat loop.

use serde_json::Value;

use crate::data::DataFrame;
use crate::store::Session;

/// Build the system prompt: assistant role, tool list, and whatever context
/// the session holds (active dataset schema and sample, indexed documents).
pub fn build_system_prompt(session: &Session) -> String {
    let mut dataset_info = String::new();
    if let Some(frame) = session.active_frame() {
        let filename = session
            .active_meta()
            .map(|m| m.filename.as_str())
            .unwrap_or("unknown");
        dataset_info = format!(
            "\n\nCurrently loaded dataset: '{}'\nColumns: {:?}\nShape: {} rows x {} columns\nColumn types: {}\nSample (first 3 rows):\n{}\n",
            filename,
            frame.columns(),
            frame.row_count(),
            frame.columns().len(),
            column_types(frame),
            sample_rows(frame),
        );
    }

    let mut doc_info = String::new();
    let doc_names = session.kb.document_names();
    if !doc_names.is_empty() {
        doc_info = format!("\n\nUploaded documents: {:?}\n", doc_names);
    }

    format!(
        r#"You are Lab Co-Pilot, a helpful assistant for laboratory researchers.
You help users analyze experimental data, create visualizations, and answer questions about uploaded research documents.

You have access to the following tools:
- filter_data: Filter the active dataset
- aggregate_data: Group and aggregate data
- describe_data: Get summary statistics
- generate_plot: Create charts (bar, pie, scatter, line, histogram, box)
- search_documents: Search uploaded documents
- execute_code: Run a custom analysis script on the dataset

Guidelines:
- When the user asks to visualize data, use generate_plot with the appropriate chart type.
- When the user asks questions about their data, use the data tools.
- When the user asks about research papers or scientific topics, use search_documents.
- For complex analyses, use execute_code.
- Always explain your results in clear, non-technical language.
- If no dataset is loaded, tell the user to upload one first.
{dataset_info}{doc_info}"#
    )
}

/// Coarse per-column type summary, e.g. `{gene: string, expression: number}`.
fn column_types(frame: &DataFrame) -> String {
    let parts: Vec<String> = frame
        .columns()
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}: {}", name, column_type(frame, i)))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

fn column_type(frame: &DataFrame, index: usize) -> &'static str {
    let mut seen: Option<&'static str> = None;
    for row in frame.rows() {
        let kind = match row.get(index) {
            Some(Value::Number(_)) => "number",
            Some(Value::Bool(_)) => "bool",
            Some(Value::String(_)) => "string",
            Some(Value::Null) | None => continue,
            Some(_) => "mixed",
        };
        match seen {
            None => seen = Some(kind),
            Some(prev) if prev != kind => return "mixed",
            Some(_) => {}
        }
    }
    seen.unwrap_or("empty")
}

fn sample_rows(frame: &DataFrame) -> String {
    let mut lines = vec![frame.columns().join(" | ")];
    for record in frame.records(3) {
        let cells: Vec<String> = frame
            .columns()
            .iter()
            .map(|c| match record.get(c) {
                Some(Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
                None => String::new(),
            })
            .collect();
        lines.push(cells.join(" | "));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::chunk_text;

    #[test]
    fn empty_session_prompt_has_no_dataset_block() {
        let prompt = build_system_prompt(&Session::new());
        assert!(prompt.contains("Lab Co-Pilot"));
        assert!(!prompt.contains("Currently loaded dataset"));
        assert!(!prompt.contains("Uploaded documents"));
    }

    #[test]
    fn dataset_schema_appears_in_prompt() {
        let mut session = Session::new();
        let frame = DataFrame::from_csv(
            b"gene,expression\nTP53,1.5\nBRCA1,2.5\n",
            "genes.csv",
        )
        .expect("csv");
        session.insert_dataset("d1".to_string(), "genes.csv".to_string(), frame);

        let prompt = build_system_prompt(&session);
        assert!(prompt.contains("Currently loaded dataset: 'genes.csv'"));
        assert!(prompt.contains("2 rows x 2 columns"));
        assert!(prompt.contains("expression: number"));
        assert!(prompt.contains("TP53"));
    }

    #[test]
    fn document_names_appear_in_prompt() {
        let mut session = Session::new();
        let chunks = chunk_text("PCR amplifies DNA.", 500, 50);
        session.kb.add("d1", "methods.txt", &chunks);

        let prompt = build_system_prompt(&session);
        assert!(prompt.contains("methods.txt"));
    }
}
