//! Plain-text tables whose columns are separated by two spaces. Headers never
//! contain whitespace so that the output can be split with `awk`.

use std::fmt::{self, Write};

const COLUMN_SEPARATOR: &str = "  ";

pub(crate) struct Row {
    cells: Vec<String>,
}

impl Row {
    fn is_awk_safe(&self) -> bool {
        self.cells
            .iter()
            .all(|cell| !cell.contains(char::is_whitespace))
    }
}

impl From<Vec<String>> for Row {
    fn from(cells: Vec<String>) -> Self {
        Row { cells }
    }
}

impl From<Vec<&str>> for Row {
    fn from(cells: Vec<&str>) -> Self {
        Row {
            cells: cells.into_iter().map(str::to_owned).collect(),
        }
    }
}

pub(crate) struct Table {
    header: Row,
    body: Vec<Row>,
    print_header: bool,
}

impl Table {
    /// Creates an empty table. Every row must have as many cells as the header.
    pub(crate) fn with_header<R: Into<Row>>(header: R) -> Table {
        let header = header.into();

        assert!(
            header.is_awk_safe(),
            "table header contains whitespace"
        );

        Table {
            header,
            body: Vec::new(),
            print_header: true,
        }
    }

    pub(crate) fn print_header(&mut self, print_header: bool) {
        self.print_header = print_header;
    }

    pub(crate) fn add_row<R: Into<Row>>(&mut self, row: R) {
        let row = row.into();

        assert_eq!(
            row.cells.len(),
            self.header.cells.len(),
            "row width does not match the header"
        );

        self.body.push(row);
    }

    fn visible_rows(&self) -> impl Iterator<Item = &Row> {
        let header = self.print_header.then_some(&self.header);

        header.into_iter().chain(self.body.iter())
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths = vec![0usize; self.header.cells.len()];

        for row in self.visible_rows() {
            for (width, cell) in widths.iter_mut().zip(row.cells.iter()) {
                *width = (*width).max(cell.chars().count());
            }
        }

        widths
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.column_widths();

        for row in self.visible_rows() {
            let last = row.cells.len().saturating_sub(1);

            for (i, cell) in row.cells.iter().enumerate() {
                if i == last {
                    // No trailing padding
                    f.write_str(cell)?;
                } else {
                    write!(f, "{:<width$}{}", cell, COLUMN_SEPARATOR, width = widths[i])?;
                }
            }

            f.write_char('\n')?;
        }

        Ok(())
    }
}

pub(crate) trait IntoTable: Into<Table> + Sized {
    fn into_table(self) -> Table {
        self.into()
    }
}

impl<T> IntoTable for T where T: Into<Table> + Sized {}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let mut tab = Table::with_header(vec!["TITLE", "MODEL"]);

        tab.add_row(vec!["Local - llama3", "llama3"]);
        tab.add_row(vec!["GPT", "acme/assistant/openai/gpt-4o"]);

        tab
    }

    #[test]
    fn test_columns_are_aligned() {
        assert_eq!(
            table().to_string(),
            concat!(
                "TITLE           MODEL\n",
                "Local - llama3  llama3\n",
                "GPT             acme/assistant/openai/gpt-4o\n",
            )
        );
    }

    #[test]
    fn test_headerless() {
        let mut tab = Table::with_header(vec!["A", "B"]);
        tab.add_row(vec!["x", "y"]);
        tab.print_header(false);

        assert_eq!(tab.to_string(), "x  y\n");
    }

    #[test]
    #[should_panic(expected = "whitespace")]
    fn test_header_must_be_awk_safe() {
        Table::with_header(vec!["MAX TOKENS"]);
    }
}
