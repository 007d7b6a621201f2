//! Post-processing transform library (§4.K). Every transform is a pure
//! function `(value, config) -> value`; referential transparency means a
//! template can be re-applied to the same extraction without side effects.
//!
//! Grounded transform-for-transform in
//! `original_source/backend-bulk/app/services/post_processor.py`. That
//! source defines `_transform_remove_chars` twice, once keyed on
//! `chars_to_remove` and once (later) keyed on `chars`/`replace_with` — the
//! registry below preserves that by registering both under the same name in
//! declaration order, so the later one wins, exactly as it did there (see
//! `DESIGN.md`'s Open Question 5).

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

type TransformFn = fn(&Value, &Value) -> Value;

fn registry() -> &'static HashMap<&'static str, TransformFn> {
    static REGISTRY: OnceLock<HashMap<&'static str, TransformFn>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut r: HashMap<&'static str, TransformFn> = HashMap::new();
        r.insert("yes_no", yes_no as TransformFn);
        r.insert("split_first", split_first);
        r.insert("split_second", split_second);
        r.insert("date_format", date_format);
        r.insert("calculate_years", calculate_years);
        r.insert("calculate_years_from_date", calculate_years);
        r.insert("currency_format", currency_format);
        r.insert("extract_regex", extract_regex);
        r.insert("lookup", lookup);
        r.insert("extract_nik_dob", extract_nik_dob);
        r.insert("remove_chars", remove_chars_v1);
        r.insert("extract_province", extract_province);
        r.insert("extract_city", extract_city);
        r.insert("default_value", default_value);
        r.insert("extract_keyword", extract_keyword);
        // Second definition of `remove_chars` in the original module, with a
        // different config shape. Registering it after the first means it
        // wins the lookup below, matching the observed behavior.
        r.insert("remove_chars", remove_chars_v2);
        r.insert("convert_date_format", convert_date_format);
        r.insert("boolean_yes_no", boolean_yes_no);
        r.insert("strip_currency_unit", strip_currency_unit);
        r.insert("normalize_npwp", normalize_npwp);
        r.insert("handle_empty_dash", handle_empty_dash);
        r.insert("extract_reference_number", extract_reference_number);
        r.insert("extract_number", extract_number);
        r.insert("remove_prefix", remove_prefix);
        r.insert("remove_suffix", remove_suffix);
        r
    })
}

/// Apply a named transform to `value`. Unknown transform types are no-ops
/// (the value passes through unchanged), logged at warn level rather than
/// failing the export.
pub fn apply_transform(transform_type: &str, value: &Value, config: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match registry().get(transform_type) {
        Some(f) => f(value, config),
        None => {
            tracing::warn!(transform = transform_type, "unknown post-process transform, passing through");
            value.clone()
        }
    }
}

fn as_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cfg_str(config: &Value, key: &str, default: &str) -> String {
    config.get(key).and_then(Value::as_str).unwrap_or(default).to_string()
}

fn s(text: impl Into<String>) -> Value {
    Value::String(text.into())
}

fn yes_no(value: &Value, config: &Value) -> Value {
    let v = as_str(value).to_lowercase();
    let v = v.trim();
    let default = cfg_str(config, "default", "N");
    if v.is_empty() || v == "-" || v == "none" {
        return s(default);
    }
    let false_keywords = config.get("false_keywords").and_then(Value::as_array);
    let true_keywords = config.get("true_keywords").and_then(Value::as_array);
    if let Some(kws) = false_keywords {
        for kw in kws.iter().filter_map(Value::as_str) {
            if v.contains(&kw.to_lowercase()) {
                return s("N");
            }
        }
    }
    if let Some(kws) = true_keywords {
        for kw in kws.iter().filter_map(Value::as_str) {
            if v.contains(&kw.to_lowercase()) {
                return s("Y");
            }
        }
    }
    const NEGATIVE: &[&str] = &["tidak tersangkut", "tidak ada", "belum", "lancar", "private", "tertutup", "green", "bahwa debitur"];
    const POSITIVE: &[&str] = &["yes", "ya", "ada", "tersangkut", "tbk", "public", "high", "red"];
    if NEGATIVE.iter().any(|w| v.contains(w)) {
        return s("N");
    }
    if POSITIVE.iter().any(|w| v.contains(w)) {
        return s("Y");
    }
    s(default)
}

fn split_first(value: &Value, config: &Value) -> Value {
    let sep = cfg_str(config, "separator", "/");
    let v = as_str(value);
    match v.split(&sep as &str).next() {
        Some(part) => s(part.trim()),
        None => s(v),
    }
}

fn split_second(value: &Value, config: &Value) -> Value {
    let sep = cfg_str(config, "separator", "/");
    let v = as_str(value);
    let parts: Vec<&str> = v.split(&sep as &str).collect();
    match parts.get(1) {
        Some(part) => s(part.trim()),
        None => s(v),
    }
}

const DATE_FORMATS: &[&str] = &["%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d", "%d %B %Y", "%d %b %Y"];

fn date_format(value: &Value, _config: &Value) -> Value {
    let v = as_str(value);
    let v = v.trim();
    if v.is_empty() || v == "-" {
        return s("");
    }
    if Regex::new(r"^\d{2}-\d{2}-\d{4}").unwrap().is_match(v) {
        return s(v);
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(v, fmt) {
            return s(date.format("%d-%m-%Y").to_string());
        }
    }
    s(v)
}

fn convert_date_format(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    if v.is_empty() || v == "-" {
        return s("");
    }
    let from_format = cfg_str(config, "from_format", "DD-MM-YYYY");
    let to_format = cfg_str(config, "to_format", "DD/MM/YYYY");
    if from_format == "DD-MM-YYYY" && to_format == "DD/MM/YYYY" {
        return s(v.trim().replace('-', "/"));
    }
    s(v)
}

fn calculate_years(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    let v = v.trim();
    if v.is_empty() || v == "-" {
        return s("");
    }
    let Some(caps) = Regex::new(r"\b(19|20)\d{2}\b").unwrap().find(v) else {
        return s(v);
    };
    let from_year: i32 = caps.as_str().parse().unwrap_or(0);
    let to_year = if config.get("to").and_then(Value::as_str) == Some("now") {
        current_year()
    } else {
        config.get("base_year").and_then(Value::as_i64).map(|y| y as i32).unwrap_or_else(current_year)
    };
    let years = to_year - from_year;
    if years == 1 {
        s("1 year")
    } else {
        s(format!("{years} years"))
    }
}

fn current_year() -> i32 {
    chrono::Utc::now().format("%Y").to_string().parse().unwrap_or(1970)
}

fn currency_format(value: &Value, _config: &Value) -> Value {
    let v = as_str(value);
    let numbers: String = Regex::new(r"\d+[,.]?\d*")
        .unwrap()
        .find_iter(&v)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join("");
    if numbers.is_empty() {
        return s(v);
    }
    let normalized = numbers.replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(num) if num.fract() == 0.0 => s(group_thousands(num as i64)),
        Ok(num) => s(format!("{num:.3}").replace('.', ",")),
        Err(_) => s(v),
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let grouped: String = grouped.chars().rev().collect();
    if n < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn strip_currency_unit(value: &Value, config: &Value) -> Value {
    let mut v = as_str(value).trim().to_string();
    if v.is_empty() {
        return s("");
    }
    let units: Vec<String> = config
        .get("units")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_else(|| {
            ["Jutaan", "Juta", "Ribuan", "Ribu", "Miliar", "Milyar"]
                .iter()
                .map(|u| u.to_string())
                .collect()
        });
    for unit in units {
        v = v.replace(&format!(" {unit}"), "").replace(&unit, "");
    }
    s(v.trim().to_string())
}

fn extract_regex(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    let Some(pattern) = config.get("pattern").and_then(Value::as_str) else {
        return s(v);
    };
    let Ok(re) = Regex::new(pattern) else {
        return s(v);
    };
    let matches: Vec<String> = re
        .captures_iter(&v)
        .map(|c| c.get(1).or_else(|| c.get(0)).map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect();
    if matches.is_empty() {
        return s(v);
    }
    let last = config.get("last").and_then(Value::as_bool).unwrap_or(false);
    if last {
        s(matches.last().unwrap().clone())
    } else {
        s(matches[0].clone())
    }
}

fn extract_number(value: &Value, _config: &Value) -> Value {
    let v = as_str(value);
    match Regex::new(r"[\d.,]+").unwrap().find(&v) {
        Some(m) => s(m.as_str()),
        None => s(v),
    }
}

fn extract_keyword(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    let v = v.trim();
    if v.is_empty() {
        return s("");
    }
    let max_words = config.get("max_words").and_then(Value::as_u64).unwrap_or(3) as usize;
    let words: Vec<&str> = v.split_whitespace().collect();
    if words.len() > max_words {
        s(words[..max_words].join(" "))
    } else {
        s(v)
    }
}

fn extract_reference_number(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    let pattern = cfg_str(config, "pattern", r"[A-Z0-9]{6,}");
    match Regex::new(&pattern).ok().and_then(|re| re.find(&v).map(|m| m.as_str().to_string())) {
        Some(m) => s(m),
        None => s(v),
    }
}

fn lookup(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    let v_trim = v.trim();
    let Some(map) = config.as_object() else {
        return s(v_trim);
    };
    if let Some(hit) = map.get(v_trim) {
        return hit.clone();
    }
    for (key, val) in map {
        if key == "default" {
            continue;
        }
        if v_trim.to_lowercase().contains(&key.to_lowercase()) {
            return val.clone();
        }
    }
    map.get("default").cloned().unwrap_or_else(|| s(v_trim))
}

/// Extract date of birth from a 16-digit Indonesian NIK: positions 6-12 are
/// DDMMYY; day > 40 indicates a female holder (subtract 40); century is
/// 19xx if the two-digit year exceeds the current two-digit year, else 20xx.
fn extract_nik_dob(value: &Value, _config: &Value) -> Value {
    let v = as_str(value);
    let v = v.trim();
    if v.len() != 16 || !v.chars().all(|c| c.is_ascii_digit()) {
        return s("");
    }
    let day: i32 = v[6..8].parse().unwrap_or(0);
    let month: i32 = v[8..10].parse().unwrap_or(0);
    let year: i32 = v[10..12].parse().unwrap_or(0);
    let day = if day > 40 { day - 40 } else { day };
    let current_yy = current_year() % 100;
    let full_year = if year > current_yy { 1900 + year } else { 2000 + year };
    s(format!("{day:02}-{month:02}-{full_year}"))
}

const PROVINCES: &[&str] = &[
    "DKI Jakarta", "Jawa Barat", "Jawa Tengah", "Jawa Timur", "Banten", "Bali",
    "Sumatera Utara", "Kepulauan Bangka Belitung",
];

fn extract_province(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    if v.is_empty() {
        return s(cfg_str(config, "default", ""));
    }
    let pattern = cfg_str(config, "pattern", r"(?i)Prov\.?\s*([^,\n]+)");
    if let Some(re) = Regex::new(&pattern).ok() {
        if let Some(caps) = re.captures(&v) {
            if let Some(m) = caps.get(1) {
                return s(m.as_str().trim());
            }
        }
    }
    for prov in PROVINCES {
        if v.to_lowercase().contains(&prov.to_lowercase()) {
            return s(*prov);
        }
    }
    s(cfg_str(config, "default", ""))
}

fn extract_city(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    if v.is_empty() {
        return s(cfg_str(config, "default", ""));
    }
    let pattern = cfg_str(config, "pattern", r"(?i)^([^,\n]+?),?\s*Prov");
    if let Some(re) = Regex::new(&pattern).ok() {
        if let Some(caps) = re.captures(&v) {
            if let Some(m) = caps.get(1) {
                return s(m.as_str().trim());
            }
        }
    }
    s(cfg_str(config, "default", ""))
}

fn remove_chars_v1(value: &Value, config: &Value) -> Value {
    let mut v = as_str(value);
    if v.is_empty() {
        return s("");
    }
    let chars = cfg_str(config, "chars_to_remove", "");
    for ch in chars.chars() {
        v = v.replace(ch, "");
    }
    s(v.trim().to_string())
}

fn remove_chars_v2(value: &Value, config: &Value) -> Value {
    let mut v = as_str(value);
    let chars = cfg_str(config, "chars", "");
    let replace_with = cfg_str(config, "replace_with", "");
    for ch in chars.chars() {
        v = v.replace(ch, &replace_with);
    }
    s(v.trim().to_string())
}

fn remove_prefix(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    let Some(prefix) = config.get("prefix").and_then(Value::as_str) else {
        return s(v);
    };
    let case_sensitive = config.get("case_sensitive").and_then(Value::as_bool).unwrap_or(true);
    if case_sensitive {
        s(v.strip_prefix(prefix).unwrap_or(&v).to_string())
    } else if v.to_lowercase().starts_with(&prefix.to_lowercase()) {
        s(v[prefix.len()..].to_string())
    } else {
        s(v)
    }
}

fn remove_suffix(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    let Some(suffix) = config.get("suffix").and_then(Value::as_str) else {
        return s(v);
    };
    let case_sensitive = config.get("case_sensitive").and_then(Value::as_bool).unwrap_or(true);
    if case_sensitive {
        s(v.strip_suffix(suffix).unwrap_or(&v).to_string())
    } else if v.to_lowercase().ends_with(&suffix.to_lowercase()) {
        s(v[..v.len() - suffix.len()].to_string())
    } else {
        s(v)
    }
}

fn normalize_npwp(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    if v.is_empty() || v == "-" {
        return s("");
    }
    let clean = v.trim().replace('-', "").replace('.', "");
    let add_decimal = config.get("add_decimal").and_then(Value::as_bool).unwrap_or(true);
    if add_decimal {
        s(format!("{clean}.0"))
    } else {
        s(clean)
    }
}

fn handle_empty_dash(value: &Value, _config: &Value) -> Value {
    let v = as_str(value);
    let v = v.trim().to_lowercase();
    if matches!(v.as_str(), "-" | "–" | "—" | "n/a" | "") {
        s("")
    } else {
        s(as_str(value))
    }
}

fn boolean_yes_no(value: &Value, config: &Value) -> Value {
    let v = as_str(value);
    if v.trim().is_empty() {
        return s(cfg_str(config, "empty_value", "No"));
    }
    let upper = v.trim().to_uppercase();
    if matches!(upper.as_str(), "Y" | "YES" | "YA" | "TRUE" | "1") {
        s("Yes")
    } else if matches!(upper.as_str(), "N" | "NO" | "TIDAK" | "FALSE" | "0" | "-") {
        s("No")
    } else {
        s(cfg_str(config, "empty_value", "No"))
    }
}

fn default_value(_value: &Value, config: &Value) -> Value {
    config.get("value").cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remove_chars_duplicate_registration_the_second_definition_wins() {
        let out = apply_transform("remove_chars", &s("a.b-c"), &json!({"chars": ".-", "replace_with": "_"}));
        assert_eq!(out, s("a_b_c"));
    }

    #[test]
    fn yes_no_prefers_negative_keywords_over_positive() {
        let out = apply_transform(
            "yes_no",
            &s("tidak ada catatan"),
            &json!({"true_keywords": ["ada"], "false_keywords": ["tidak ada"]}),
        );
        assert_eq!(out, s("N"));
    }

    #[test]
    fn nik_dob_handles_female_day_offset_and_century() {
        // day field 41 -> female, day 01; year 99 -> 1999 (assuming current yy < 99)
        let out = apply_transform("extract_nik_dob", &s("3201014109990001"), &json!({}));
        assert_eq!(out, s("01-09-1999"));
    }

    #[test]
    fn date_format_parses_slash_separated_date() {
        let out = apply_transform("date_format", &s("05/03/2020"), &json!({}));
        assert_eq!(out, s("05-03-2020"));
    }

    #[test]
    fn unknown_transform_passes_value_through() {
        let out = apply_transform("does_not_exist", &s("x"), &json!({}));
        assert_eq!(out, s("x"));
    }

    #[test]
    fn null_value_stays_null() {
        assert_eq!(apply_transform("yes_no", &Value::Null, &json!({})), Value::Null);
    }

    /// "Rp 1.500 Jutaan" through `strip_currency_unit` then `currency_format`:
    /// the unit word is stripped first, leaving "Rp 1.500"; `currency_format`
    /// then reads the embedded "." as a decimal point rather than a
    /// thousands separator, parsing 1.5 and reformatting it to three
    /// decimals with a comma, producing "1,500" rather than the "1.500" one
    /// might expect from the raw digits. This is the same output the
    /// original post-processor produces for the same input (checked by hand
    /// against `post_processor.py`), so it is preserved as-is rather than
    /// special-cased — see DESIGN.md's Open Question decision on this.
    #[test]
    fn currency_format_after_strip_currency_unit_reads_the_dot_as_decimal() {
        let stripped = apply_transform("strip_currency_unit", &s("Rp 1.500 Jutaan"), &json!({}));
        assert_eq!(stripped, s("Rp 1.500"));
        let formatted = apply_transform("currency_format", &stripped, &json!({}));
        assert_eq!(formatted, s("1,500"));
    }
}
