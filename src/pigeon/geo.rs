//! Country lookup and great-circle distances between capitals.
//!
//! Some codes deliberately carry no coordinates (uninhabited territories). The
//! provider reports those as unresolvable and callers pick another destination.

use serde::{Deserialize, Serialize};

use crate::pigeon::errors::PigeonError;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Haversine distance in kilometres.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Resolves country codes for travel.
pub trait GeoProvider: Send + Sync {
    /// Every code the provider knows about, resolvable or not.
    fn country_codes(&self) -> Vec<String>;

    /// Capital coordinates, `None` when the code has no usable data.
    fn locate(&self, code: &str) -> Option<Coordinates>;

    /// Main language spoken in the country.
    fn language(&self, code: &str) -> Option<String>;

    fn country_name(&self, code: &str) -> Option<String>;

    fn distance_km(&self, from: &str, to: &str) -> Option<f64> {
        let from = self.locate(from)?;
        let to = self.locate(to)?;
        Some(from.distance_km(&to))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryInfo {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub capital: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub language: Option<String>,
}

/// In-memory country table.
#[derive(Debug, Clone)]
pub struct CountryAtlas {
    countries: Vec<CountryInfo>,
}

// code, name, capital, latitude, longitude, language
const BUILTIN_COUNTRIES: &[(&str, &str, &str, f64, f64, &str)] = &[
    ("NL", "Netherlands", "Amsterdam", 52.37, 4.90, "Dutch"),
    ("BE", "Belgium", "Brussels", 50.85, 4.35, "Dutch"),
    ("DE", "Germany", "Berlin", 52.52, 13.40, "German"),
    ("FR", "France", "Paris", 48.86, 2.35, "French"),
    ("GB", "United Kingdom", "London", 51.51, -0.13, "English"),
    ("IE", "Ireland", "Dublin", 53.35, -6.26, "English"),
    ("ES", "Spain", "Madrid", 40.42, -3.70, "Spanish"),
    ("PT", "Portugal", "Lisbon", 38.72, -9.14, "Portuguese"),
    ("IT", "Italy", "Rome", 41.90, 12.50, "Italian"),
    ("CH", "Switzerland", "Bern", 46.95, 7.45, "German"),
    ("AT", "Austria", "Vienna", 48.21, 16.37, "German"),
    ("PL", "Poland", "Warsaw", 52.23, 21.01, "Polish"),
    ("SE", "Sweden", "Stockholm", 59.33, 18.07, "Swedish"),
    ("NO", "Norway", "Oslo", 59.91, 10.75, "Norwegian"),
    ("FI", "Finland", "Helsinki", 60.17, 24.94, "Finnish"),
    ("DK", "Denmark", "Copenhagen", 55.68, 12.57, "Danish"),
    ("GR", "Greece", "Athens", 37.98, 23.73, "Greek"),
    ("TR", "Turkey", "Ankara", 39.93, 32.86, "Turkish"),
    ("RU", "Russia", "Moscow", 55.76, 37.62, "Russian"),
    ("UA", "Ukraine", "Kyiv", 50.45, 30.52, "Ukrainian"),
    ("EG", "Egypt", "Cairo", 30.04, 31.24, "Arabic"),
    ("MA", "Morocco", "Rabat", 34.02, -6.84, "Arabic"),
    ("NG", "Nigeria", "Abuja", 9.08, 7.40, "English"),
    ("KE", "Kenya", "Nairobi", -1.29, 36.82, "Swahili"),
    ("ZA", "South Africa", "Pretoria", -25.75, 28.19, "Zulu"),
    ("US", "United States", "Washington", 38.91, -77.04, "English"),
    ("CA", "Canada", "Ottawa", 45.42, -75.70, "English"),
    ("MX", "Mexico", "Mexico City", 19.43, -99.13, "Spanish"),
    ("BR", "Brazil", "Brasilia", -15.79, -47.88, "Portuguese"),
    ("AR", "Argentina", "Buenos Aires", -34.60, -58.38, "Spanish"),
    ("CL", "Chile", "Santiago", -33.45, -70.67, "Spanish"),
    ("PE", "Peru", "Lima", -12.05, -77.04, "Spanish"),
    ("CO", "Colombia", "Bogota", 4.71, -74.07, "Spanish"),
    ("IN", "India", "New Delhi", 28.61, 77.21, "Hindi"),
    ("CN", "China", "Beijing", 39.90, 116.41, "Chinese"),
    ("JP", "Japan", "Tokyo", 35.68, 139.69, "Japanese"),
    ("KR", "South Korea", "Seoul", 37.57, 126.98, "Korean"),
    ("ID", "Indonesia", "Jakarta", -6.21, 106.85, "Indonesian"),
    ("TH", "Thailand", "Bangkok", 13.76, 100.50, "Thai"),
    ("VN", "Vietnam", "Hanoi", 21.03, 105.85, "Vietnamese"),
    ("PH", "Philippines", "Manila", 14.60, 120.98, "Filipino"),
    ("AU", "Australia", "Canberra", -35.28, 149.13, "English"),
    ("NZ", "New Zealand", "Wellington", -41.29, 174.78, "English"),
    ("SA", "Saudi Arabia", "Riyadh", 24.71, 46.68, "Arabic"),
    ("IR", "Iran", "Tehran", 35.69, 51.39, "Persian"),
    ("IL", "Israel", "Jerusalem", 31.77, 35.21, "Hebrew"),
];

// Territories without a capital to fly to.
const UNRESOLVABLE_COUNTRIES: &[(&str, &str)] = &[
    ("AQ", "Antarctica"),
    ("BV", "Bouvet Island"),
    ("HM", "Heard Island and McDonald Islands"),
    ("UM", "United States Minor Outlying Islands"),
];

impl CountryAtlas {
    pub fn from_entries(countries: Vec<CountryInfo>) -> Self {
        Self { countries }
    }

    /// Load an atlas from a JSON array of [`CountryInfo`].
    pub fn from_json(json: &str) -> Result<Self, PigeonError> {
        let countries: Vec<CountryInfo> = serde_json::from_str(json)?;
        Ok(Self::from_entries(countries))
    }

    pub fn load(path: &std::path::Path) -> Result<Self, PigeonError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    fn find(&self, code: &str) -> Option<&CountryInfo> {
        self.countries
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code.trim()))
    }
}

impl Default for CountryAtlas {
    fn default() -> Self {
        let mut countries: Vec<CountryInfo> = BUILTIN_COUNTRIES
            .iter()
            .map(|(code, name, capital, lat, lon, language)| CountryInfo {
                code: code.to_string(),
                name: name.to_string(),
                capital: Some(capital.to_string()),
                coordinates: Some(Coordinates::new(*lat, *lon)),
                language: Some(language.to_string()),
            })
            .collect();
        countries.extend(UNRESOLVABLE_COUNTRIES.iter().map(|(code, name)| CountryInfo {
            code: code.to_string(),
            name: name.to_string(),
            capital: None,
            coordinates: None,
            language: None,
        }));
        Self { countries }
    }
}

impl GeoProvider for CountryAtlas {
    fn country_codes(&self) -> Vec<String> {
        self.countries.iter().map(|c| c.code.clone()).collect()
    }

    fn locate(&self, code: &str) -> Option<Coordinates> {
        self.find(code).and_then(|c| c.coordinates)
    }

    fn language(&self, code: &str) -> Option<String> {
        self.find(code).and_then(|c| c.language.clone())
    }

    fn country_name(&self, code: &str) -> Option<String> {
        self.find(code).map(|c| c.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amsterdam_to_paris_is_about_430km() {
        let atlas = CountryAtlas::default();
        let km = atlas.distance_km("NL", "FR").expect("both resolvable");
        assert!((400.0..470.0).contains(&km), "got {}", km);
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let atlas = CountryAtlas::default();
        assert!(atlas.locate("nl").is_some());
        assert_eq!(atlas.language("jp").as_deref(), Some("Japanese"));
    }

    #[test]
    fn territories_without_capital_are_unresolvable() {
        let atlas = CountryAtlas::default();
        assert!(atlas.country_codes().contains(&"AQ".to_string()));
        assert!(atlas.locate("AQ").is_none());
        assert!(atlas.distance_km("NL", "AQ").is_none());
        assert!(atlas.locate("XX").is_none());
    }

    #[test]
    fn atlas_loads_from_json() {
        let json = r#"[
            {"code": "AA", "name": "Alpha", "coordinates": {"latitude": 0.0, "longitude": 0.0}, "language": "Alphan"},
            {"code": "BB", "name": "Beta"}
        ]"#;
        let atlas = CountryAtlas::from_json(json).expect("parse");
        assert_eq!(atlas.len(), 2);
        assert!(atlas.locate("AA").is_some());
        assert!(atlas.locate("BB").is_none());
    }
}
