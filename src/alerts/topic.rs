//! Publish topic derived from station ownership

use crate::data::{Location, WindowRow};

/// Build `{country}/{state}/{city}/{user}/in`. Parts are not validated.
pub fn build_topic(country: &str, state: &str, city: &str, user: &str) -> String {
    format!("{}/{}/{}/{}/in", country, state, city, user)
}

/// Ownership path of one station
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub country: String,
    pub state: String,
    pub city: String,
    pub user: String,
}

impl Route {
    /// `None` when the owner or the location is missing
    pub fn from_parts(owner_user: Option<&str>, location: Option<&Location>) -> Option<Self> {
        let location = location?;
        Some(Self {
            country: location.country.clone(),
            state: location.state.clone(),
            city: location.city.clone(),
            user: owner_user?.to_string(),
        })
    }

    pub fn from_row(row: &WindowRow) -> Option<Self> {
        Self::from_parts(row.owner_user.as_deref(), row.location.as_ref())
    }

    pub fn topic(&self) -> String {
        build_topic(&self.country, &self.state, &self.city, &self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_topic() {
        assert_eq!(build_topic("CO", "ANT", "MED", "user1"), "CO/ANT/MED/user1/in");
    }

    #[test]
    fn test_build_topic_passes_parts_verbatim() {
        assert_eq!(build_topic("", "a/b", "MED", ""), "/a/b/MED//in");
    }

    #[test]
    fn test_route_requires_owner_and_location() {
        let location = Location::new("MED", "ANT", "CO");

        let route = Route::from_parts(Some("user1"), Some(&location)).unwrap();
        assert_eq!(route.topic(), "CO/ANT/MED/user1/in");

        assert!(Route::from_parts(None, Some(&location)).is_none());
        assert!(Route::from_parts(Some("user1"), None).is_none());
    }
}
