use crate::model::CityRecord;

/// Token that selects every catalog row.
pub const WILDCARD: &str = "ALL";

/// Country selection for an ingestion run or a country lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountryFilter {
    All,
    /// Country name or ISO-2 code, compared case-insensitively.
    Country(String),
}

impl CountryFilter {
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token.eq_ignore_ascii_case(WILDCARD) {
            CountryFilter::All
        } else {
            CountryFilter::Country(token.to_string())
        }
    }

    pub fn matches(&self, city: &CityRecord) -> bool {
        match self {
            CountryFilter::All => true,
            CountryFilter::Country(token) => country_matches(token, &city.country_name, &city.country_code),
        }
    }
}

impl std::fmt::Display for CountryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountryFilter::All => f.write_str(WILDCARD),
            CountryFilter::Country(token) => f.write_str(token),
        }
    }
}

/// Case-insensitive equality with either the country name or the code.
///
/// Shared by ingestion and the stored-observation lookup so both agree on
/// what "a country" means.
pub fn country_matches(token: &str, country_name: &str, country_code: &str) -> bool {
    let token = token.to_lowercase();
    country_name.to_lowercase() == token || country_code.to_lowercase() == token
}

/// Keep the records selected by `filter`, preserving their order.
pub fn filter_by_country<'a, I>(cities: I, filter: &'a CountryFilter) -> impl Iterator<Item = CityRecord> + 'a
where
    I: IntoIterator<Item = CityRecord>,
    I::IntoIter: 'a,
{
    cities.into_iter().filter(move |city| filter.matches(city))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city(name: &str, country: &str, code: &str) -> CityRecord {
        CityRecord {
            name: name.into(),
            country_name: country.into(),
            country_code: code.into(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    fn catalog() -> Vec<CityRecord> {
        vec![
            city("New York", "United States", "US"),
            city("Paris", "France", "FR"),
            city("Los Angeles", "United States", "US"),
            city("Sydney", "Australia", "AU"),
        ]
    }

    fn names(cities: impl Iterator<Item = CityRecord>) -> Vec<String> {
        cities.map(|c| c.name).collect()
    }

    #[test]
    fn wildcard_is_case_insensitive() {
        assert_eq!(CountryFilter::parse("ALL"), CountryFilter::All);
        assert_eq!(CountryFilter::parse("all"), CountryFilter::All);
        assert_eq!(CountryFilter::parse(" All "), CountryFilter::All);
        assert_eq!(CountryFilter::parse("US"), CountryFilter::Country("US".into()));
    }

    #[test]
    fn wildcard_keeps_full_catalog() {
        let filter = CountryFilter::parse("all");
        assert_eq!(filter_by_country(catalog(), &filter).count(), catalog().len());
    }

    #[test]
    fn matches_code_or_name_ignoring_case() {
        let by_code = CountryFilter::parse("us");
        assert_eq!(names(filter_by_country(catalog(), &by_code)), ["New York", "Los Angeles"]);

        let by_name = CountryFilter::parse("united states");
        assert_eq!(names(filter_by_country(catalog(), &by_name)), ["New York", "Los Angeles"]);
    }

    #[test]
    fn no_substring_matches() {
        // "us" is inside "Australia", but only whole names or codes count.
        let filter = CountryFilter::parse("us");
        assert!(!filter.matches(&city("Sydney", "Australia", "AU")));

        let filter = CountryFilter::parse("Fran");
        assert_eq!(filter_by_country(catalog(), &filter).count(), 0);
    }

    #[test]
    fn unknown_country_yields_empty_sequence() {
        let filter = CountryFilter::parse("Atlantis");
        assert_eq!(filter_by_country(catalog(), &filter).count(), 0);
    }
}
