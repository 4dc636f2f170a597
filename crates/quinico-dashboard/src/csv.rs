use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};

pub const DOWNLOAD_NAME: &str = "quinico_data.csv";

const SEPARATOR: char = ',';
const LINE_END: &str = "\r\n";

/// In-memory CSV document, served as a file download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvDocument {
    body: String,
}

impl CsvDocument {
    pub fn with_header<S: AsRef<str>>(header: &[S]) -> Self {
        let mut document = Self::default();
        document.push_row(header);
        document
    }

    pub fn push_row<S: AsRef<str>>(&mut self, row: &[S]) {
        for (index, cell) in row.iter().enumerate() {
            if index > 0 {
                self.body.push(SEPARATOR);
            }
            push_cell(&mut self.body, cell.as_ref());
        }
        self.body.push_str(LINE_END);
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }
}

impl IntoResponse for CsvDocument {
    fn into_response(self) -> Response {
        (
            [
                (CONTENT_TYPE, "text/csv".to_owned()),
                (
                    CONTENT_DISPOSITION,
                    format!("attachment;filename={DOWNLOAD_NAME}"),
                ),
            ],
            self.body,
        )
            .into_response()
    }
}

fn needs_quotes(cell: &str) -> bool {
    cell.contains(SEPARATOR) || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
}

fn push_cell(out: &mut String, cell: &str) {
    if needs_quotes(cell) {
        out.push('"');
        out.push_str(&cell.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_with_separators_or_quotes_are_quoted() {
        let mut document = CsvDocument::with_header(&["keyword", "url"]);
        document.push_row(&["shoes, red", "https://example.com/?q=\"red\""]);
        document.push_row(&["plain", ""]);

        assert_eq!(
            document.as_str(),
            "keyword,url\r\n\"shoes, red\",\"https://example.com/?q=\"\"red\"\"\"\r\nplain,\r\n"
        );
    }

    #[test]
    fn response_is_an_attachment() {
        let response = CsvDocument::with_header(&["date", "rank"]).into_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(b"text/csv".as_slice())
        );
        assert_eq!(
            response
                .headers()
                .get(CONTENT_DISPOSITION)
                .map(|v| v.as_bytes()),
            Some(b"attachment;filename=quinico_data.csv".as_slice())
        );
    }
}
