// annotation.rs
//
// Joins pathway / GO annotation terms onto matrix rows by protein identifier.

use std::collections::HashMap;

use log::{debug, info};

use crate::matrix::{AbundanceMatrix, TextColumn};

/// Separator placed between annotation values collected for one identifier.
pub const VALUE_SEPARATOR: &str = "; ";

/// Number of terms kept per field in the frequency report.
pub const TOP_N: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    /// Join key; may hold several identifiers separated by `;` or `,`.
    pub key: Option<String>,
    /// One value per entry of [`AnnotationTable::fields`].
    pub values: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationTable {
    pub key_column: String,
    pub fields: Vec<String>,
    pub records: Vec<AnnotationRecord>,
}

impl AnnotationTable {
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }
}

/// Identifier form used on both sides of the join.
#[inline]
pub fn normalize_identifier(id: &str) -> String {
    id.trim().to_uppercase()
}

/// Normalized identifier -> every value of one annotation field, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationMap {
    pub field: String,
    entries: HashMap<String, String>,
}

impl AnnotationMap {
    /// Build the map for `field`. A field absent from the table yields an empty map.
    pub fn build(table: &AnnotationTable, field: &str) -> Self {
        let mut accumulators: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(field_idx) = table.field_index(field) {
            for record in &table.records {
                let value = record.values.get(field_idx).and_then(Option::as_ref);
                let (Some(key), Some(value)) = (&record.key, value) else {
                    continue;
                };
                for sub_id in key.split([';', ',']) {
                    let sub_id = normalize_identifier(sub_id);
                    if !sub_id.is_empty() {
                        accumulators.entry(sub_id).or_default().push(value.clone());
                    }
                }
            }
        }

        let entries: HashMap<String, String> = accumulators
            .into_iter()
            .map(|(id, values)| (id, values.join(VALUE_SEPARATOR)))
            .collect();
        debug!("Annotation map for '{}' covers {} identifiers.", field, entries.len());

        Self {
            field: field.to_string(),
            entries,
        }
    }

    pub fn lookup(&self, row_id: &str) -> Option<&str> {
        self.entries.get(&normalize_identifier(row_id)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Copy of `matrix` with one annotation column appended per `(column_name, map)`.
pub fn annotate(matrix: &AbundanceMatrix, maps: &[(String, AnnotationMap)]) -> AbundanceMatrix {
    let mut annotated = matrix.clone();
    for (column, map) in maps {
        let values: Vec<Option<String>> = matrix
            .row_ids
            .iter()
            .map(|id| map.lookup(id).map(str::to_string))
            .collect();
        let matched = values.iter().filter(|v| v.is_some()).count();
        info!(
            "Annotation '{}' -> column '{}': {} of {} rows matched.",
            map.field,
            column,
            matched,
            values.len()
        );
        annotated.annotations.push(TextColumn::new(column.clone(), values));
    }
    annotated
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationCount {
    pub annotation: String,
    pub count: usize,
    pub field_label: String,
}

/// Most frequent values of an annotation column, missing values excluded.
///
/// Values with equal counts keep first-encounter order; callers should not rely on it.
pub fn top_counts(column: &TextColumn, label: &str, n: usize) -> Vec<AnnotationCount> {
    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();
    for value in column.values.iter().flatten() {
        match position.get(value.as_str()) {
            Some(&idx) => order[idx].1 += 1,
            None => {
                position.insert(value.as_str(), order.len());
                order.push((value.as_str(), 1));
            }
        }
    }
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
        .into_iter()
        .take(n)
        .map(|(annotation, count)| AnnotationCount {
            annotation: annotation.to_string(),
            count,
            field_label: label.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn record(key: Option<&str>, value: Option<&str>) -> AnnotationRecord {
        AnnotationRecord {
            key: key.map(str::to_string),
            values: vec![value.map(str::to_string)],
        }
    }

    fn table(records: Vec<AnnotationRecord>) -> AnnotationTable {
        AnnotationTable {
            key_column: "UniProt".into(),
            fields: vec!["KEGG name".into()],
            records,
        }
    }

    #[test]
    fn multi_key_rows_accumulate_in_source_order() {
        let t = table(vec![
            record(Some("P1;P2"), Some("Pathway A")),
            record(Some("P1"), Some("Pathway B")),
        ]);
        let map = AnnotationMap::build(&t, "KEGG name");
        assert_eq!(map.lookup("P1"), Some("Pathway A; Pathway B"));
        assert_eq!(map.lookup("P2"), Some("Pathway A"));
        assert_eq!(map.lookup("P3"), None);
    }

    #[test]
    fn identifiers_are_normalized_and_blank_parts_skipped() {
        let t = table(vec![
            record(Some(" p1 , ;q9"), Some("X")),
            record(Some("P1"), None),
            record(None, Some("ignored")),
        ]);
        let map = AnnotationMap::build(&t, "KEGG name");
        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup("  P1"), Some("X"));
        assert_eq!(map.lookup("q9 "), Some("X"));
    }

    #[test]
    fn short_records_are_skipped() {
        let mut t = table(vec![record(Some("P1"), Some("X"))]);
        t.fields.push("GOMF name".into());
        t.records.push(record(Some("P2"), Some("Y")));
        t.records.push(AnnotationRecord {
            key: Some("P3".into()),
            values: Vec::new(),
        });
        assert!(AnnotationMap::build(&t, "GOMF name").is_empty());
        let kegg = AnnotationMap::build(&t, "KEGG name");
        assert_eq!(kegg.len(), 2);
        assert_eq!(kegg.lookup("P3"), None);
    }

    #[test]
    fn unknown_field_gives_empty_map() {
        let t = table(vec![record(Some("P1"), Some("X"))]);
        assert!(AnnotationMap::build(&t, "GOMF name").is_empty());
    }

    #[test]
    fn annotate_appends_columns_and_leaves_input_alone() {
        let m = AbundanceMatrix {
            index_name: "id".into(),
            row_ids: vec!["p1".into(), "P2".into(), "P3".into()],
            samples: vec!["s".into()],
            values: array![[1.0], [2.0], [3.0]],
            metadata: Vec::new(),
            annotations: Vec::new(),
        };
        let t = table(vec![record(Some("P1;P2"), Some("A")), record(Some("P1"), Some("B"))]);
        let maps = vec![("KEGG_Pathway".to_string(), AnnotationMap::build(&t, "KEGG name"))];
        let annotated = annotate(&m, &maps);
        assert!(m.annotations.is_empty());
        let col = annotated.annotation("KEGG_Pathway").unwrap();
        assert_eq!(
            col.values,
            vec![Some("A; B".to_string()), Some("A".to_string()), None]
        );
        assert_eq!(annotated.values, m.values);
    }

    #[test]
    fn top_counts_rank_by_frequency() {
        let mut values: Vec<Option<String>> = Vec::new();
        for (term, n) in [("rare", 1), ("common", 5), ("mid", 3)] {
            for _ in 0..n {
                values.push(Some(term.to_string()));
            }
        }
        values.push(None);
        values.push(None);
        let col = TextColumn::new("KEGG_Pathway", values);
        let top = top_counts(&col, "KEGG Pathway", 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].annotation, "common");
        assert_eq!(top[0].count, 5);
        assert_eq!(top[1].annotation, "mid");
        assert!(top.iter().all(|c| c.field_label == "KEGG Pathway"));
    }

    #[test]
    fn top_counts_caps_at_n() {
        let values = (0..30).map(|i| Some(format!("term{i}"))).collect();
        let col = TextColumn::new("GO_CC", values);
        let top = top_counts(&col, "GO Cellular Component", TOP_N);
        assert_eq!(top.len(), TOP_N);
        assert!(top.iter().all(|c| c.count == 1));
    }
}
