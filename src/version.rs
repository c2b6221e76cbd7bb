use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of a semantic version to increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BumpComponent {
    #[default]
    None,
    Pre,
    Patch,
    Minor,
    Major,
}

impl fmt::Display for BumpComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BumpComponent::None => "none",
            BumpComponent::Pre => "pre",
            BumpComponent::Patch => "patch",
            BumpComponent::Minor => "minor",
            BumpComponent::Major => "major",
        };
        f.write_str(s)
    }
}

/// Bump `version` and return its tag set.
///
/// The first element is always the full new version. A release version also
/// yields `major.minor` and `major`; a pre-release yields only itself.
/// Strings that are not semantic versions come back unchanged.
pub fn bump(version: &str, component: BumpComponent) -> Vec<String> {
    let mut v = match parse_lenient(version) {
        Some(v) => v,
        None => {
            tracing::warn!("{} not semver so can't bump", version);
            return vec![version.to_string()];
        }
    };

    match component {
        BumpComponent::None => {}
        BumpComponent::Pre => {
            if v.pre.is_empty() {
                tracing::warn!("{} has no pre-release to increment", version);
            } else {
                let current = v.pre.as_str().parse::<u64>().unwrap_or_else(|_| {
                    tracing::warn!("Can't increment pre-release {}", v.pre);
                    0
                });
                match Prerelease::new(&(current + 1).to_string()) {
                    Ok(pre) => v.pre = pre,
                    Err(err) => tracing::warn!("Failed to set pre-release on {}: {}", version, err),
                }
            }
        }
        BumpComponent::Patch => {
            // a pre-release of x.y.z is released as x.y.z
            if v.pre.is_empty() {
                v.patch += 1;
            }
            v.pre = Prerelease::EMPTY;
            v.build = BuildMetadata::EMPTY;
        }
        BumpComponent::Minor => {
            v.minor += 1;
            v.patch = 0;
            v.pre = Prerelease::EMPTY;
            v.build = BuildMetadata::EMPTY;
        }
        BumpComponent::Major => {
            v.major += 1;
            v.minor = 0;
            v.patch = 0;
            v.pre = Prerelease::EMPTY;
            v.build = BuildMetadata::EMPTY;
        }
    }

    if !v.pre.is_empty() {
        return vec![v.to_string()];
    }
    vec![
        v.to_string(),
        format!("{}.{}", v.major, v.minor),
        v.major.to_string(),
    ]
}

/// Accepts a leading `v` and missing minor/patch numbers, so `v1.2` reads as
/// `1.2.0`.
fn parse_lenient(version: &str) -> Option<Version> {
    let trimmed = version.strip_prefix(['v', 'V']).unwrap_or(version);
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() >= 3 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);
    Version::parse(&padded).ok()
}
