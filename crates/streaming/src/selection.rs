use foundation::SourceLocation;
use serde::Serialize;

/// Source locations the user currently wants rendered (desired state).
///
/// Insertion-ordered and free of duplicates. Only [`SelectionSet::toggle`]
/// mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct SelectionSet {
    locations: Vec<SourceLocation>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_locations(locations: impl IntoIterator<Item = SourceLocation>) -> Self {
        let mut set = Self::new();
        for loc in locations {
            if !set.contains(&loc) {
                set.locations.push(loc);
            }
        }
        set
    }

    /// Adds `location` if absent, removes it if present.
    ///
    /// Returns whether the location is selected afterwards.
    pub fn toggle(&mut self, location: &SourceLocation) -> bool {
        if let Some(idx) = self.locations.iter().position(|l| l == location) {
            self.locations.remove(idx);
            false
        } else {
            self.locations.push(location.clone());
            true
        }
    }

    pub fn contains(&self, location: &SourceLocation) -> bool {
        self.locations.iter().any(|l| l == location)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceLocation> {
        self.locations.iter()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::SelectionSet;
    use foundation::SourceLocation;

    #[test]
    fn toggle_is_symmetric() {
        let a = SourceLocation::from("a.laz");
        let mut s = SelectionSet::new();
        assert!(s.toggle(&a));
        assert!(s.contains(&a));
        assert!(!s.toggle(&a));
        assert!(s.is_empty());
    }

    #[test]
    fn keeps_insertion_order() {
        let mut s = SelectionSet::new();
        for name in ["c", "a", "b"] {
            s.toggle(&SourceLocation::from(name));
        }
        s.toggle(&SourceLocation::from("a"));
        let order: Vec<&str> = s.iter().map(|l| l.as_str()).collect();
        assert_eq!(order, vec!["c", "b"]);
    }

    #[test]
    fn from_locations_drops_duplicates() {
        let s = SelectionSet::from_locations(
            ["x", "y", "x"].into_iter().map(SourceLocation::from),
        );
        assert_eq!(s.len(), 2);
    }
}
