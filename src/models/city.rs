use serde::{Deserialize, Serialize};
use validator::Validate;

/// A supported city with its reference point and known areas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CityInfo {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    #[serde(default)]
    pub areas: Vec<String>,
}

impl CityInfo {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            areas: Vec::new(),
        }
    }

    pub fn with_areas<I, S>(mut self, areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.areas = areas.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered catalog of supported cities.
///
/// The first entry doubles as the fallback reference point for cities
/// without coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityCatalog {
    cities: Vec<CityInfo>,
}

impl CityCatalog {
    /// Empty catalog
    pub fn empty() -> Self {
        Self { cities: Vec::new() }
    }

    /// Add a city, replacing any existing entry with the same name
    pub fn with_city(mut self, city: CityInfo) -> Self {
        self.insert(city);
        self
    }

    pub fn insert(&mut self, city: CityInfo) {
        match self.cities.iter_mut().find(|c| c.name == city.name) {
            Some(existing) => *existing = city,
            None => self.cities.push(city),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CityInfo> {
        self.cities.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.cities.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn cities(&self) -> &[CityInfo] {
        &self.cities
    }

    /// Reference point for `name`, or the first catalog city's point
    pub fn reference_point(&self, name: &str) -> Option<(f64, f64)> {
        self.get(name)
            .or_else(|| self.cities.first())
            .map(|c| (c.latitude, c.longitude))
    }
}

impl Default for CityCatalog {
    fn default() -> Self {
        let cities = vec![
            CityInfo::new("Delhi", 28.6139, 77.2090).with_areas([
                "Connaught Place", "Karol Bagh", "Lajpat Nagar", "Saket", "Dwarka",
                "Rohini", "Pitampura", "Janakpuri", "Vasant Kunj", "Greater Kailash",
                "Malviya Nagar", "Hauz Khas", "Rajouri Garden", "Paschim Vihar",
                "Uttam Nagar", "Vikaspuri", "Noida", "Gurgaon", "Faridabad", "Ghaziabad",
            ]),
            CityInfo::new("Mumbai", 19.0760, 72.8777).with_areas([
                "Bandra", "Andheri", "Powai", "Malad", "Borivali", "Thane",
                "Navi Mumbai", "Dadar", "Parel", "Worli", "Juhu", "Goregaon",
                "Kandivali", "Mira Road", "Vasai", "Kalyan", "Dombivli", "Ulhasnagar",
            ]),
            CityInfo::new("Chennai", 13.0827, 80.2707).with_areas([
                "T. Nagar", "Anna Nagar", "Velachery", "Adyar", "Mylapore",
                "Egmore", "Nungambakkam", "Kodambakkam", "Saidapet", "Tambaram",
                "Chromepet", "Pallavaram", "St. Thomas Mount", "Guindy", "Perungudi",
            ]),
            CityInfo::new("Bangalore", 12.9716, 77.5946).with_areas([
                "Koramangala", "Indiranagar", "Whitefield", "Electronic City",
                "Marathahalli", "HSR Layout", "BTM Layout", "Jayanagar",
                "JP Nagar", "Banashankari", "Malleshwaram", "Rajajinagar",
                "Vijayanagar", "Yeshwanthpur", "Hebbal", "Yelahanka",
            ]),
            CityInfo::new("Pune", 18.5204, 73.8567).with_areas([
                "Koregaon Park", "Baner", "Aundh", "Hinjewadi", "Wakad",
                "Pimpri", "Chinchwad", "Hadapsar", "Kondhwa", "Katraj",
                "Swargate", "Deccan", "Shivajinagar", "Camp", "Bund Garden",
            ]),
            CityInfo::new("Hyderabad", 17.3850, 78.4867).with_areas([
                "Banjara Hills", "Jubilee Hills", "Gachibowli", "HITEC City",
                "Kondapur", "Madhapur", "Kukatpally", "Miyapur", "Dilshuknagar",
                "Malakpet", "Secunderabad", "Begumpet", "Somajiguda", "Abids",
            ]),
            CityInfo::new("Ahmedabad", 23.0225, 72.5714).with_areas([
                "Bodakdev", "Satellite", "Vastrapur", "Navrangpura", "C.G. Road",
                "Maninagar", "Naroda", "Bapunagar", "Isanpur", "Vatva",
                "Narol", "Asarwa", "Sabarmati", "Chandkheda", "Motera",
            ]),
        ];

        Self { cities }
    }
}
