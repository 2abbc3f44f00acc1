use crate::models::TranscriptRecord;

pub const CSV_HEADER: &str = "Call ID,Date Time,From,To,Direction,Duration,Transcript,Recording URL";

/// Renders records as CSV. Only the transcript column is quoted; the other
/// columns are written as-is and must not contain commas or newlines.
pub fn to_csv(records: &[TranscriptRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(CSV_HEADER.to_string());
    lines.extend(records.iter().map(csv_row));
    lines.join("\n")
}

fn csv_row(record: &TranscriptRecord) -> String {
    let transcript = quote(&record.transcript);
    [
        record.id.as_str(),
        record.datetime.as_str(),
        record.from.as_str(),
        record.to.as_str(),
        record.direction.as_str(),
        record.duration.as_str(),
        transcript.as_str(),
        record.recording_url.as_str(),
    ]
    .join(",")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
