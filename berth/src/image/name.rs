//! Parsed image references.

use crate::errors::{BerthError, BerthResult};
use std::fmt;
use std::str::FromStr;

/// Tag or digest component of an image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageTag {
    Tag(String),
    Digest(String),
}

/// A normalized `registry/repository:tag|@digest` reference.
///
/// Immutable once parsed. [`ImageName::canonical`] is the identity used as
/// the existence-cache key: two references that render the same string are
/// the same image as far as the cache is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName {
    registry: Option<String>,
    repository: String,
    tag: ImageTag,
}

impl ImageName {
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &ImageTag {
        &self.tag
    }

    /// The string identity of this reference, as handed to the daemon.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Parse a reference, defaulting the tag to `latest`.
    pub fn parse(raw: &str) -> BerthResult<Self> {
        if raw.is_empty() || raw.contains(char::is_whitespace) {
            return Err(BerthError::InvalidImageName(raw.to_string()));
        }

        // A leading component is a registry only if it looks like a host:
        // contains a dot or a port, or is the literal "localhost".
        let (registry, remainder) = match raw.split_once('/') {
            Some((head, rest))
                if head.contains('.') || head.contains(':') || head == "localhost" =>
            {
                (Some(head.to_string()), rest)
            }
            _ => (None, raw),
        };

        if let Some((repository, digest)) = remainder.split_once('@') {
            if repository.is_empty() || digest.is_empty() {
                return Err(BerthError::InvalidImageName(raw.to_string()));
            }
            return Ok(Self {
                registry,
                repository: repository.to_string(),
                tag: ImageTag::Digest(digest.to_string()),
            });
        }

        // The tag separator is the last ':' after the final '/', so that
        // registry ports in un-split references don't parse as tags.
        let (repository, tag) = match remainder.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => {
                if repo.is_empty() || tag.is_empty() {
                    return Err(BerthError::InvalidImageName(raw.to_string()));
                }
                (repo.to_string(), ImageTag::Tag(tag.to_string()))
            }
            _ => (remainder.to_string(), ImageTag::Tag("latest".to_string())),
        };

        if repository.is_empty() {
            return Err(BerthError::InvalidImageName(raw.to_string()));
        }

        Ok(Self {
            registry,
            repository,
            tag,
        })
    }
}

impl FromStr for ImageName {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        match &self.tag {
            ImageTag::Tag(tag) => write!(f, "{}:{}", self.repository, tag),
            ImageTag::Digest(digest) => write!(f, "{}@{}", self.repository, digest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_repository_defaults_latest() {
        let name: ImageName = "busybox".parse().unwrap();
        assert_eq!(name.registry(), None);
        assert_eq!(name.repository(), "busybox");
        assert_eq!(name.tag(), &ImageTag::Tag("latest".into()));
        assert_eq!(name.canonical(), "busybox:latest");
    }

    #[test]
    fn test_parse_repository_with_tag() {
        let name: ImageName = "redis:7.2-alpine".parse().unwrap();
        assert_eq!(name.canonical(), "redis:7.2-alpine");
    }

    #[test]
    fn test_parse_registry_and_namespace() {
        let name: ImageName = "ghcr.io/acme/api:v1".parse().unwrap();
        assert_eq!(name.registry(), Some("ghcr.io"));
        assert_eq!(name.repository(), "acme/api");
        assert_eq!(name.canonical(), "ghcr.io/acme/api:v1");
    }

    #[test]
    fn test_parse_registry_with_port_is_not_a_tag() {
        let name: ImageName = "localhost:5000/app".parse().unwrap();
        assert_eq!(name.registry(), Some("localhost:5000"));
        assert_eq!(name.repository(), "app");
        assert_eq!(name.canonical(), "localhost:5000/app:latest");
    }

    #[test]
    fn test_parse_digest_reference() {
        let raw = "redis@sha256:0123456789abcdef";
        let name: ImageName = raw.parse().unwrap();
        assert_eq!(name.tag(), &ImageTag::Digest("sha256:0123456789abcdef".into()));
        assert_eq!(name.canonical(), raw);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ImageName::parse("").is_err());
        assert!(ImageName::parse("red is:latest").is_err());
        assert!(ImageName::parse("redis:").is_err());
        assert!(ImageName::parse("@sha256:abc").is_err());
    }

    #[test]
    fn test_canonical_is_stable_identity() {
        let a: ImageName = "busybox".parse().unwrap();
        let b: ImageName = "busybox:latest".parse().unwrap();
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a, b);
    }
}
