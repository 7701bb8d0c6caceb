/// Survey CSV parsing
///
/// A deliberately small reader: lines split on `\n`, fields split on `,`.
/// Quoted fields are not recognised, so a comma inside quotes still
/// splits the field.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed survey table
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// Column names from the first non-blank line, trimmed
    pub headers: Vec<String>,
    /// One mapping of header to cell per data line
    pub rows: Vec<BTreeMap<String, String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Parse CSV text into a table
///
/// Blank lines are skipped. Rows shorter than the header are padded with
/// empty strings; cells past the last header are dropped. Input with no
/// non-blank line yields an empty table.
pub fn parse(text: &str) -> Table {
    let mut lines = text.split('\n').filter(|line| !line.trim().is_empty());

    let Some(header_line) = lines.next() else {
        return Table::default();
    };
    let headers: Vec<String> = split_fields(header_line).collect();

    let rows = lines
        .map(|line| {
            let mut values = split_fields(line);
            headers
                .iter()
                .map(|header| (header.clone(), values.next().unwrap_or_default()))
                .collect()
        })
        .collect();

    Table { headers, rows }
}

fn split_fields(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(',').map(|field| field.trim().to_string())
}

/// Bar-chart input derived from a survey
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChartSeries {
    /// Dataset label (the first column's header)
    pub label: Option<String>,
    /// `Response 1`, `Response 2`, ...
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

/// Chart the first column of a survey, one bar per response
///
/// Cells that are not numbers count as 1.0.
pub fn chart_series(table: &Table) -> ChartSeries {
    let first = table.headers.first();

    let labels = (1..=table.rows.len())
        .map(|n| format!("Response {}", n))
        .collect();

    let values = table
        .rows
        .iter()
        .map(|row| {
            first
                .and_then(|header| row.get(header))
                .and_then(|cell| cell.parse::<f64>().ok())
                .filter(|value| value.is_finite())
                .unwrap_or(1.0)
        })
        .collect();

    ChartSeries {
        label: first.cloned(),
        labels,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_basic_table() {
        let table = parse("a,b\n1,2\n3,4");
        assert_eq!(table.headers, vec!["a", "b"]);
        assert_eq!(
            table.rows,
            vec![row(&[("a", "1"), ("b", "2")]), row(&[("a", "3"), ("b", "4")])]
        );
    }

    #[test]
    fn test_blank_lines_ignored() {
        let table = parse("a,b\n1,2\n\n3,4\n   \n");
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_short_and_long_rows() {
        let table = parse("name, age ,ward\nRavi\nMeena,31,K-East,extra");
        assert_eq!(table.headers, vec!["name", "age", "ward"]);
        assert_eq!(table.rows[0], row(&[("name", "Ravi"), ("age", ""), ("ward", "")]));
        assert_eq!(
            table.rows[1],
            row(&[("name", "Meena"), ("age", "31"), ("ward", "K-East")])
        );
    }

    #[test]
    fn test_crlf_and_leading_blank_lines() {
        let table = parse("\r\n\nq1,q2\r\nyes,no\r\n");
        assert_eq!(table.headers, vec!["q1", "q2"]);
        assert_eq!(table.rows, vec![row(&[("q1", "yes"), ("q2", "no")])]);
    }

    #[test]
    fn test_empty_input() {
        let table = parse("\n  \n");
        assert!(table.headers.is_empty());
        assert!(table.rows.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_quoted_commas_still_split() {
        let table = parse("a,b\n\"x,y\",z");
        assert_eq!(table.rows[0]["a"], "\"x");
        assert_eq!(table.rows[0]["b"], "y\"");
    }

    #[test]
    fn test_chart_series_first_column() {
        let table = parse("score,comment\n4,good\nn/a,meh\n2.5,ok");
        let series = chart_series(&table);
        assert_eq!(series.label.as_deref(), Some("score"));
        assert_eq!(series.labels, vec!["Response 1", "Response 2", "Response 3"]);
        assert_eq!(series.values, vec![4.0, 1.0, 2.5]);
    }

    #[test]
    fn test_chart_series_empty_table() {
        let series = chart_series(&Table::default());
        assert!(series.label.is_none());
        assert!(series.labels.is_empty());
        assert!(series.values.is_empty());
    }
}
