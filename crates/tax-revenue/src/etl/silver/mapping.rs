use super::normalizer::normalize_identifier;
use crate::etl::domain::Country;
use std::collections::HashMap;
use std::sync::OnceLock;

static COUNTRY_INDEX: OnceLock<HashMap<String, &'static Country>> = OnceLock::new();

const fn country(
    iso2: &'static str,
    iso3: &'static str,
    canonical_name: &'static str,
) -> Country {
    Country {
        iso2,
        iso3,
        canonical_name,
    }
}

/// OECD member countries.
pub(crate) const COUNTRIES: &[Country] = &[
    country("AU", "AUS", "Australia"),
    country("AT", "AUT", "Austria"),
    country("BE", "BEL", "Belgium"),
    country("CA", "CAN", "Canada"),
    country("CL", "CHL", "Chile"),
    country("CO", "COL", "Colombia"),
    country("CR", "CRI", "Costa Rica"),
    country("CZ", "CZE", "Czechia"),
    country("DK", "DNK", "Denmark"),
    country("EE", "EST", "Estonia"),
    country("FI", "FIN", "Finland"),
    country("FR", "FRA", "France"),
    country("DE", "DEU", "Germany"),
    country("GR", "GRC", "Greece"),
    country("HU", "HUN", "Hungary"),
    country("IS", "ISL", "Iceland"),
    country("IE", "IRL", "Ireland"),
    country("IL", "ISR", "Israel"),
    country("IT", "ITA", "Italy"),
    country("JP", "JPN", "Japan"),
    country("KR", "KOR", "Korea"),
    country("LV", "LVA", "Latvia"),
    country("LT", "LTU", "Lithuania"),
    country("LU", "LUX", "Luxembourg"),
    country("MX", "MEX", "Mexico"),
    country("NL", "NLD", "Netherlands"),
    country("NZ", "NZL", "New Zealand"),
    country("NO", "NOR", "Norway"),
    country("PL", "POL", "Poland"),
    country("PT", "PRT", "Portugal"),
    country("SK", "SVK", "Slovak Republic"),
    country("SI", "SVN", "Slovenia"),
    country("ES", "ESP", "Spain"),
    country("SE", "SWE", "Sweden"),
    country("CH", "CHE", "Switzerland"),
    country("TR", "TUR", "Türkiye"),
    country("GB", "GBR", "United Kingdom"),
    country("US", "USA", "United States"),
];

/// Spellings seen in OECD and UN extracts, keyed to iso3.
const ALIASES: &[(&str, &str)] = &[
    ("Czech Republic", "CZE"),
    ("Republic of Korea", "KOR"),
    ("Korea, Republic of", "KOR"),
    ("South Korea", "KOR"),
    ("Slovakia", "SVK"),
    ("Turkey", "TUR"),
    ("Turkiye", "TUR"),
    ("UK", "GBR"),
    ("Great Britain", "GBR"),
    ("United States of America", "USA"),
    ("The Netherlands", "NLD"),
    ("Holland", "NLD"),
];

/// Resolves an ISO2 code, ISO3 code, canonical name or alias.
pub(crate) fn lookup(identifier: &str) -> Option<&'static Country> {
    country_index()
        .get(&normalize_identifier(identifier))
        .copied()
}

pub(crate) fn lookup_iso3(iso3: &str) -> Option<&'static Country> {
    let trimmed = iso3.trim();
    COUNTRIES
        .iter()
        .find(|country| country.iso3.eq_ignore_ascii_case(trimmed))
}

fn country_index() -> &'static HashMap<String, &'static Country> {
    COUNTRY_INDEX.get_or_init(|| {
        let mut map = HashMap::with_capacity(COUNTRIES.len() * 3 + ALIASES.len());
        for entry in COUNTRIES {
            map.insert(normalize_identifier(entry.iso2), entry);
            map.insert(normalize_identifier(entry.iso3), entry);
            map.insert(normalize_identifier(entry.canonical_name), entry);
        }
        for (alias, iso3) in ALIASES {
            if let Some(entry) = COUNTRIES.iter().find(|country| country.iso3 == *iso3) {
                map.insert(normalize_identifier(alias), entry);
            }
        }
        map
    })
}
