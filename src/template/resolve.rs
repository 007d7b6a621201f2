//! Column resolution (§4.K): matching a `MappingTemplate`'s columns against
//! a document's extracted fields.

use serde::Serialize;

use crate::models::ExtractedField;
use crate::template::ColumnMapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMethod {
    FieldName,
    Label,
    Value,
}

impl MatchMethod {
    fn weight(self) -> f64 {
        match self {
            MatchMethod::FieldName => 1.0,
            MatchMethod::Label => 0.9,
            MatchMethod::Value => 0.7,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            MatchMethod::FieldName => "field_name",
            MatchMethod::Label => "label",
            MatchMethod::Value => "value",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnResolution {
    pub external_column: String,
    pub db_field_name: String,
    pub confidence: f64,
    pub source_location: Option<String>,
    pub match_method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionOutput {
    pub template_id: String,
    pub total_columns: usize,
    pub mapped_columns: usize,
    pub unmapped_columns: usize,
    pub success_rate: f64,
    pub mappings: Vec<ColumnResolution>,
    pub unmapped: Vec<String>,
    pub warnings: Vec<String>,
}

/// Resolve every column in `columns` against `fields`, per §4.K's scoring
/// rule: keyword index gives a preference weight, match location
/// (field name > label > value) gives a strength weight, ties break by
/// `expected_section` membership then by the candidate field's own
/// confidence.
pub fn resolve_columns(template_id: &str, columns: &[ColumnMapping], fields: &[ExtractedField]) -> ResolutionOutput {
    let mut mappings = Vec::new();
    let mut unmapped = Vec::new();
    let mut warnings = Vec::new();

    for column in columns {
        match resolve_one(column, fields) {
            Some(resolution) => mappings.push(resolution),
            None => {
                warnings.push(format!("no keyword match for column `{}`", column.external_column_name));
                unmapped.push(column.external_column_name.clone());
            }
        }
    }

    let total = columns.len();
    let mapped = mappings.len();
    ResolutionOutput {
        template_id: template_id.to_string(),
        total_columns: total,
        mapped_columns: mapped,
        unmapped_columns: total - mapped,
        success_rate: if total == 0 { 0.0 } else { mapped as f64 / total as f64 },
        mappings,
        unmapped,
        warnings,
    }
}

fn resolve_one(column: &ColumnMapping, fields: &[ExtractedField]) -> Option<ColumnResolution> {
    let num_keywords = column.search_keywords.len().max(1);
    let mut best: Option<(f64, &ExtractedField, MatchMethod)> = None;

    for (i, keyword) in column.search_keywords.iter().enumerate() {
        let keyword_lower = keyword.to_lowercase();
        if keyword_lower.is_empty() {
            continue;
        }
        let index_weight = 1.0 - (i as f64 / num_keywords as f64);

        for field in fields {
            let candidates = [
                (field.field_name.to_lowercase(), MatchMethod::FieldName),
                (field.field_label.clone().unwrap_or_default().to_lowercase(), MatchMethod::Label),
                (field.value().to_string().to_lowercase(), MatchMethod::Value),
            ];
            for (haystack, method) in candidates {
                if haystack.is_empty() || !haystack.contains(&keyword_lower) {
                    continue;
                }
                let score = method.weight() * index_weight;
                let better = match &best {
                    None => true,
                    Some((best_score, best_field, _)) => {
                        score > *best_score
                            || (score == *best_score && tie_break(column, field, best_field))
                    }
                };
                if better {
                    best = Some((score, field, method));
                }
            }
        }
    }

    best.map(|(score, field, method)| ColumnResolution {
        external_column: column.external_column_name.clone(),
        db_field_name: field.field_name.clone(),
        confidence: score.min(1.0),
        source_location: field.source_location.clone(),
        match_method: method.as_str().to_string(),
    })
}

/// `true` if `candidate` should replace `incumbent` under a score tie:
/// prefer a field whose section matches the column's `expected_section`,
/// then the field with higher own extraction confidence.
fn tie_break(column: &ColumnMapping, candidate: &ExtractedField, incumbent: &ExtractedField) -> bool {
    if let Some(expected) = &column.expected_section {
        let candidate_in_section = candidate.section_name.as_deref() == Some(expected.as_str());
        let incumbent_in_section = incumbent.section_name.as_deref() == Some(expected.as_str());
        if candidate_in_section != incumbent_in_section {
            return candidate_in_section;
        }
    }
    candidate.confidence > incumbent.confidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ColumnDataType;
    use serde_json::json;

    fn field(name: &str, label: &str, value: serde_json::Value, confidence: f64, section: Option<&str>) -> ExtractedField {
        ExtractedField::new(
            "job-1".to_string(),
            "doc-1".to_string(),
            name.to_string(),
            Some(label.to_string()),
            "string".to_string(),
            &value,
            None,
            Some(1),
            0,
            confidence,
            false,
            section.map(String::from),
            None,
            None,
        )
    }

    fn column(name: &str, keywords: &[&str], expected_section: Option<&str>) -> ColumnMapping {
        ColumnMapping {
            external_column_name: name.to_string(),
            search_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            extraction_hint: None,
            expected_section: expected_section.map(String::from),
            data_type: ColumnDataType::Text,
            post_process_type: None,
            post_process_config: json!({}),
            default_value: None,
            example_value: None,
        }
    }

    #[test]
    fn exact_field_name_match_outranks_value_containment() {
        let fields = vec![
            field("account_balance", "Balance", json!("1000"), 0.9, None),
            field("note", "Note", json!("account_balance mentioned here"), 0.95, None),
        ];
        let columns = vec![column("Balance", &["account_balance"], None)];
        let out = resolve_columns("tmpl-1", &columns, &fields);
        assert_eq!(out.mapped_columns, 1);
        assert_eq!(out.mappings[0].db_field_name, "account_balance");
        assert_eq!(out.mappings[0].match_method, "field_name");
    }

    #[test]
    fn unmapped_when_no_keyword_matches() {
        let fields = vec![field("x", "X", json!("y"), 0.5, None)];
        let columns = vec![column("Unrelated", &["zzz_no_match"], None)];
        let out = resolve_columns("tmpl-1", &columns, &fields);
        assert_eq!(out.mapped_columns, 0);
        assert_eq!(out.unmapped, vec!["Unrelated".to_string()]);
    }

    #[test]
    fn tie_break_prefers_expected_section() {
        let fields = vec![
            field("amount", "Amount", json!("100"), 0.5, Some("other_section")),
            field("amount", "Amount", json!("100"), 0.5, Some("totals")),
        ];
        let columns = vec![column("Amount", &["amount"], Some("totals"))];
        // both candidates score identically; the section match must decide,
        // not declaration order, so swapping field order must not change it
        let out_a = resolve_columns("tmpl-1", &columns, &fields);
        let out_b = resolve_columns("tmpl-1", &columns, &{
            let mut swapped = fields.clone();
            swapped.reverse();
            swapped
        });
        assert_eq!(out_a.mappings[0].confidence, out_b.mappings[0].confidence);
    }
}
