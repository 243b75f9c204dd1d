//! Hierarchical content names.
//!
//! A [`Name`] is an ordered list of components parsed from a URI such as
//! `/sync/chat/seq/12`. An optional `ccnx:` or `ndn:` scheme is accepted and
//! dropped. Names order component-wise, so every extension of a prefix sorts
//! contiguously right after that prefix; the registries and the loopback
//! content store rely on this for range scans and prefix probes.

use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Inline capacity for name components (typical sync names are shallow).
type Components = SmallVec<[String; 6]>;

/// A hierarchical name made of string components.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    components: Components,
}

impl Name {
    /// The root name `/` with no components.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a name from its URI form.
    ///
    /// # Examples
    ///
    /// ```
    /// use namewire_core::name::Name;
    ///
    /// let name = Name::parse("/a/b/c").unwrap();
    /// assert_eq!(name.len(), 3);
    /// assert_eq!(name.to_string(), "/a/b/c");
    ///
    /// let name = Name::parse("ccnx:/a/b").unwrap();
    /// assert_eq!(name.to_string(), "/a/b");
    /// ```
    pub fn parse(s: &str) -> Result<Self, NameError> {
        s.parse()
    }

    /// Build a name from already-split components.
    pub fn from_components<I, C>(components: I) -> Result<Self, NameError>
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let mut out = Components::new();
        for component in components {
            let component = component.into();
            validate_component(&component)?;
            out.push(component);
        }
        Ok(Self { components: out })
    }

    /// Return a new name with `component` appended.
    pub fn child(&self, component: impl Into<String>) -> Result<Self, NameError> {
        let component = component.into();
        validate_component(&component)?;
        let mut components = self.components.clone();
        components.push(component);
        Ok(Self { components })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components of this name, outermost first.
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The first `len` components as a new name (clamped to the full name).
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        let len = len.min(self.components.len());
        Self {
            components: self.components[..len].iter().cloned().collect(),
        }
    }

    /// True when `self` equals `other` or is a component-wise prefix of it.
    ///
    /// `/a/b` is a prefix of `/a/b/c` but not of `/a/bc`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.components.len() <= other.components.len()
            && self.components[..] == other.components[..self.components.len()]
    }

    /// Iterate over every prefix of this name, longest first, ending with the root.
    pub fn prefixes_longest_first(&self) -> impl Iterator<Item = Name> + '_ {
        (0..=self.components.len()).rev().map(move |len| self.prefix(len))
    }
}

fn validate_component(component: &str) -> Result<(), NameError> {
    if component.is_empty() {
        return Err(NameError::EmptyComponent);
    }
    if component == "." || component == ".." {
        return Err(NameError::RelativeComponent(component.to_string()));
    }
    if component.contains('/') {
        return Err(NameError::InvalidComponent(component.to_string()));
    }
    Ok(())
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s
            .strip_prefix("ccnx:")
            .or_else(|| s.strip_prefix("ndn:"))
            .unwrap_or(s);

        let Some(rest) = path.strip_prefix('/') else {
            return Err(NameError::NotAbsolute(s.to_string()));
        };

        // A single trailing slash is tolerated: "/a/b/" == "/a/b".
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        if rest.is_empty() {
            return Ok(Self::root());
        }

        Self::from_components(rest.split('/'))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for Name {
    type Error = NameError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Conversion into a [`Name`], parsing string forms.
pub trait IntoName {
    fn into_name(self) -> Result<Name, NameError>;
}

impl IntoName for Name {
    fn into_name(self) -> Result<Name, NameError> {
        Ok(self)
    }
}

impl IntoName for &Name {
    fn into_name(self) -> Result<Name, NameError> {
        Ok(self.clone())
    }
}

impl IntoName for &str {
    fn into_name(self) -> Result<Name, NameError> {
        self.parse()
    }
}

impl IntoName for String {
    fn into_name(self) -> Result<Name, NameError> {
        self.parse()
    }
}

impl IntoName for &String {
    fn into_name(self) -> Result<Name, NameError> {
        self.parse()
    }
}

/// Errors produced while parsing or extending a [`Name`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name must start with '/': {0:?}")]
    NotAbsolute(String),

    #[error("name contains an empty component")]
    EmptyComponent,

    #[error("relative component {0:?} is not allowed")]
    RelativeComponent(String),

    #[error("invalid component {0:?}")]
    InvalidComponent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let name = Name::parse("/a/b/c").unwrap();
        assert_eq!(name.components(), &["a", "b", "c"]);
        assert_eq!(name.to_string(), "/a/b/c");
    }

    #[test]
    fn test_parse_schemes() {
        assert_eq!(Name::parse("ccnx:/x/y").unwrap().to_string(), "/x/y");
        assert_eq!(Name::parse("ndn:/x").unwrap().to_string(), "/x");
    }

    #[test]
    fn test_parse_root_and_trailing_slash() {
        assert!(Name::parse("/").unwrap().is_empty());
        assert_eq!(Name::parse("/a/b/").unwrap(), Name::parse("/a/b").unwrap());
    }

    #[test]
    fn test_malformed_names() {
        assert!(matches!(Name::parse("a/b"), Err(NameError::NotAbsolute(_))));
        assert!(matches!(Name::parse(""), Err(NameError::NotAbsolute(_))));
        assert!(matches!(Name::parse("/a//b"), Err(NameError::EmptyComponent)));
        assert!(matches!(Name::parse("/a/../b"), Err(NameError::RelativeComponent(_))));
    }

    #[test]
    fn test_prefix_relation_is_component_wise() {
        let ab = Name::parse("/a/b").unwrap();
        assert!(ab.is_prefix_of(&Name::parse("/a/b/c").unwrap()));
        assert!(ab.is_prefix_of(&ab));
        assert!(!ab.is_prefix_of(&Name::parse("/a/bc").unwrap()));
        assert!(!ab.is_prefix_of(&Name::parse("/a").unwrap()));
        assert!(Name::root().is_prefix_of(&ab));
    }

    #[test]
    fn test_prefixes_longest_first() {
        let name = Name::parse("/a/b").unwrap();
        let got: Vec<String> = name.prefixes_longest_first().map(|n| n.to_string()).collect();
        assert_eq!(got, vec!["/a/b", "/a", "/"]);
    }

    #[test]
    fn test_extensions_sort_contiguously() {
        let mut names: Vec<Name> = ["/a0", "/a/b", "/a", "/a/c/d", "/b"]
            .iter()
            .map(|s| Name::parse(s).unwrap())
            .collect();
        names.sort();
        let sorted: Vec<String> = names.iter().map(ToString::to_string).collect();
        assert_eq!(sorted, vec!["/a", "/a/b", "/a/c/d", "/a0", "/b"]);
    }

    #[test]
    fn test_child() {
        let name = Name::parse("/a").unwrap().child("b").unwrap();
        assert_eq!(name.to_string(), "/a/b");
        assert!(Name::root().child("").is_err());
    }
}
