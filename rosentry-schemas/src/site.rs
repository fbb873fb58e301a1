use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static, slowly-changing metadata for one treatment site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub site_id: u32,
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Lookup table of known sites. Readings reference profiles by id; they never own them.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    profiles: HashMap<u32, SiteProfile>,
}

impl SiteRegistry {
    pub fn new(profiles: impl IntoIterator<Item = SiteProfile>) -> Self {
        let profiles = profiles.into_iter().map(|p| (p.site_id, p)).collect();
        Self { profiles }
    }

    pub fn by_id(&self, site_id: u32) -> Option<&SiteProfile> {
        self.profiles.get(&site_id)
    }

    /// The profile named `site_name`; the lowest id wins if a name is shared.
    pub fn by_name(&self, site_name: &str) -> Option<&SiteProfile> {
        self.profiles
            .values()
            .filter(|p| p.site_name == site_name)
            .min_by_key(|p| p.site_id)
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(site_id: u32, site_name: &str) -> SiteProfile {
        SiteProfile {
            site_id,
            site_name: site_name.to_string(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    #[test]
    fn shared_names_resolve_to_the_lowest_id() {
        let registry =
            SiteRegistry::new([profile(9, "Intake"), profile(4, "Intake"), profile(2, "Outfall")]);
        assert_eq!(registry.by_name("Intake").unwrap().site_id, 4);
        assert_eq!(registry.by_id(2).unwrap().site_name, "Outfall");
        assert!(registry.by_name("Nowhere").is_none());
    }
}
