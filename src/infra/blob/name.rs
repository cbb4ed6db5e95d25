use anyhow::{Result, bail};
use std::fmt;

/// A container (bucket) name that satisfies the storage naming rules:
/// 3 to 63 characters of lowercase letters, digits and single hyphens,
/// beginning and ending with a letter or digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName(String);

impl ContainerName {
    pub fn parse(name: &str) -> Result<Self> {
        let len = name.len();
        if !(3..=63).contains(&len) {
            bail!("container name '{name}' must be 3-63 characters long, got {len}");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            bail!("container name '{name}' may only contain lowercase letters, digits and hyphens");
        }
        if name.starts_with('-') || name.ends_with('-') {
            bail!("container name '{name}' must start and end with a letter or digit");
        }
        if name.contains("--") {
            bail!("container name '{name}' must not contain consecutive hyphens");
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["abc", "useraccountspoc", "my-container-1", "a".repeat(63).as_str()] {
            assert!(ContainerName::parse(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in [
            "ab",
            "a".repeat(64).as_str(),
            "Upper",
            "under_score",
            "-leading",
            "trailing-",
            "double--hyphen",
            "has space",
        ] {
            assert!(ContainerName::parse(name).is_err(), "{name}");
        }
    }
}
