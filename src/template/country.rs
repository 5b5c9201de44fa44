//! ISO 3166-1 alpha-2 country code expansion
//!
//! Geocoding backends usually hand back bare ISO codes; when
//! `use_full_country_names` is set, `{country}` expands to the English
//! short name instead. Unknown codes pass through unchanged.

/// English short name for an ISO 3166-1 alpha-2 code
pub fn full_name(code: &str) -> Option<&'static str> {
    let upper = code.to_ascii_uppercase();
    let name = match upper.as_str() {
        "AR" => "Argentina",
        "AT" => "Austria",
        "AU" => "Australia",
        "BE" => "Belgium",
        "BR" => "Brazil",
        "CA" => "Canada",
        "CH" => "Switzerland",
        "CL" => "Chile",
        "CN" => "China",
        "CO" => "Colombia",
        "CZ" => "Czechia",
        "DE" => "Germany",
        "DK" => "Denmark",
        "EE" => "Estonia",
        "EG" => "Egypt",
        "ES" => "Spain",
        "FI" => "Finland",
        "FR" => "France",
        "GB" => "United Kingdom",
        "GR" => "Greece",
        "HR" => "Croatia",
        "HU" => "Hungary",
        "ID" => "Indonesia",
        "IE" => "Ireland",
        "IL" => "Israel",
        "IN" => "India",
        "IS" => "Iceland",
        "IT" => "Italy",
        "JP" => "Japan",
        "KE" => "Kenya",
        "KR" => "South Korea",
        "LT" => "Lithuania",
        "LV" => "Latvia",
        "MA" => "Morocco",
        "MX" => "Mexico",
        "MY" => "Malaysia",
        "NL" => "Netherlands",
        "NO" => "Norway",
        "NZ" => "New Zealand",
        "PE" => "Peru",
        "PH" => "Philippines",
        "PL" => "Poland",
        "PT" => "Portugal",
        "RO" => "Romania",
        "RS" => "Serbia",
        "SE" => "Sweden",
        "SG" => "Singapore",
        "SI" => "Slovenia",
        "SK" => "Slovakia",
        "TH" => "Thailand",
        "TR" => "Turkey",
        "TW" => "Taiwan",
        "UA" => "Ukraine",
        "US" => "United States",
        "VN" => "Vietnam",
        "ZA" => "South Africa",
        _ => return None,
    };
    Some(name)
}

/// Expand a country value when full names are requested.
///
/// Values that are not two-letter codes (already full names) are kept.
pub fn expand(value: &str, use_full_names: bool) -> String {
    if use_full_names && value.len() == 2 {
        if let Some(name) = full_name(value) {
            return name.to_string();
        }
    }
    value.to_string()
}
