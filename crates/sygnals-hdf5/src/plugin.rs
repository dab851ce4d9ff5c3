//! Plugin contract towards the sygnals host.
//!
//! The host constructs a [`PluginAdapter`] with its own API version. The
//! version check happens once, in [`PluginAdapter::load`], so an adapter
//! value that exists is always compatible with its host.
//!
//! ```rust,ignore
//! use sygnals_hdf5::plugin::{PluginAdapter, ReaderCapable};
//!
//! let adapter = PluginAdapter::load("1.4.0")?;
//! let container = adapter.open_reader(Path::new("run.h5"))?;
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{Error, Result};
use crate::options::WriteOptions;
use crate::reader::Container;
use crate::writer::WriteSession;

/// Plugin name as registered with the host.
pub const PLUGIN_NAME: &str = "sygnals-hdf5";

/// Format identifier in read and write capability sets.
pub const FORMAT_NAME: &str = "hdf5-dataset";

/// Host API versions this plugin works with.
pub const SYGNALS_API_RANGE: &str = ">=1.0.0,<2.0.0";

/// Entry point in `<module_path>:<ClassName>` form.
pub const ENTRY_POINT: &str = "sygnals_hdf5::plugin:PluginAdapter";

const DESCRIPTION: &str = "Read and write HDF5 datasets with basic group and dataset support";

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> ApiVersion {
        ApiVersion {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    /// Accepts `1`, `1.2` and `1.2.3`; missing parts are zero.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(format!("malformed version {s:?}"));
        }
        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| format!("malformed version {s:?}"))?;
        }
        Ok(ApiVersion::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Half-open range `>=min,<max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub min: ApiVersion,
    pub max: ApiVersion,
}

impl VersionRange {
    /// Parse `>=a.b.c,<x.y.z`; whitespace around the clauses is ignored.
    pub fn parse(s: &str) -> std::result::Result<VersionRange, String> {
        let (lower, upper) = s
            .split_once(',')
            .ok_or_else(|| format!("range {s:?} needs a lower and an upper bound"))?;
        let min: ApiVersion = lower
            .trim()
            .strip_prefix(">=")
            .ok_or_else(|| format!("lower bound {lower:?} must start with >="))?
            .parse()?;
        let max: ApiVersion = upper
            .trim()
            .strip_prefix('<')
            .filter(|rest| !rest.starts_with('='))
            .ok_or_else(|| format!("upper bound {upper:?} must start with <"))?
            .parse()?;
        if max <= min {
            return Err(format!("empty range {s:?}"));
        }
        Ok(VersionRange { min, max })
    }

    pub fn contains(&self, version: ApiVersion) -> bool {
        self.min <= version && version < self.max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">={},<{}", self.min, self.max)
    }
}

/// Who the plugin is and which host versions it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginIdentity {
    pub name: String,
    pub version: String,
    pub api_compatibility_range: VersionRange,
}

/// Format identifiers the plugin reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub read_formats: BTreeSet<String>,
    pub write_formats: BTreeSet<String>,
}

impl Capabilities {
    pub fn can_read(&self, format: &str) -> bool {
        self.read_formats.contains(format)
    }

    pub fn can_write(&self, format: &str) -> bool {
        self.write_formats.contains(format)
    }
}

/// Values of the host's plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    pub sygnals_api: String,
    pub description: String,
    pub entry_point: String,
}

impl PluginManifest {
    /// The manifest as `key: value` lines, in the host's field order.
    pub fn to_manifest_string(&self) -> String {
        format!(
            "name: {}\nversion: {}\nsygnals_api: \"{}\"\ndescription: {}\nentry_point: {}\n",
            self.name, self.version, self.sygnals_api, self.description, self.entry_point
        )
    }
}

/// Host capability: open containers for reading.
pub trait ReaderCapable {
    fn open_reader(&self, path: &Path) -> Result<Container>;
}

/// Host capability: start write sessions.
pub trait WriterCapable {
    fn open_writer(&self, path: &Path, options: WriteOptions) -> Result<WriteSession>;
}

/// The plugin object the host constructs and owns.
#[derive(Debug, Clone)]
pub struct PluginAdapter {
    host_api: ApiVersion,
    range: VersionRange,
}

impl PluginAdapter {
    /// Check `host_api_version` against [`SYGNALS_API_RANGE`].
    pub fn load(host_api_version: &str) -> Result<PluginAdapter> {
        let range = VersionRange::parse(SYGNALS_API_RANGE).map_err(Error::invalid)?;
        let incompatible = || Error::ApiCompatibility {
            host: host_api_version.to_string(),
            supported: range.to_string(),
        };
        let host_api: ApiVersion = host_api_version.parse().map_err(|_| incompatible())?;
        if !range.contains(host_api) {
            return Err(incompatible());
        }
        debug!(host = %host_api, plugin = env!("CARGO_PKG_VERSION"), "plugin loaded");
        Ok(PluginAdapter { host_api, range })
    }

    /// Host API version accepted at load.
    pub fn host_api(&self) -> ApiVersion {
        self.host_api
    }

    pub fn identity(&self) -> PluginIdentity {
        PluginIdentity {
            name: PLUGIN_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_compatibility_range: self.range,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        let formats: BTreeSet<String> = [FORMAT_NAME.to_string()].into();
        Capabilities {
            read_formats: formats.clone(),
            write_formats: formats,
        }
    }

    pub fn manifest(&self) -> PluginManifest {
        PluginManifest {
            name: PLUGIN_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sygnals_api: self.range.to_string(),
            description: DESCRIPTION.to_string(),
            entry_point: ENTRY_POINT.to_string(),
        }
    }
}

impl ReaderCapable for PluginAdapter {
    fn open_reader(&self, path: &Path) -> Result<Container> {
        Container::open(path)
    }
}

impl WriterCapable for PluginAdapter {
    fn open_writer(&self, path: &Path, options: WriteOptions) -> Result<WriteSession> {
        WriteSession::create_with(path, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn version_parsing() {
        assert_eq!("1.2.3".parse::<ApiVersion>().unwrap(), ApiVersion::new(1, 2, 3));
        assert_eq!("2".parse::<ApiVersion>().unwrap(), ApiVersion::new(2, 0, 0));
        assert!("1.2.3.4".parse::<ApiVersion>().is_err());
        assert!("1.x".parse::<ApiVersion>().is_err());
        assert!("".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn range_bounds() {
        let range = VersionRange::parse(SYGNALS_API_RANGE).unwrap();
        assert!(range.contains(ApiVersion::new(1, 0, 0)));
        assert!(range.contains(ApiVersion::new(1, 99, 7)));
        assert!(!range.contains(ApiVersion::new(2, 0, 0)));
        assert!(!range.contains(ApiVersion::new(0, 9, 9)));
        assert_eq!(range.to_string(), SYGNALS_API_RANGE);
        assert!(VersionRange::parse(">=2.0.0,<1.0.0").is_err());
        assert!(VersionRange::parse(">=1.0.0,<=2.0.0").is_err());
        assert!(VersionRange::parse("1.0.0").is_err());
    }

    #[test]
    fn load_checks_host_version() {
        assert!(PluginAdapter::load("1.3.0").is_ok());
        for bad in ["2.0.0", "0.9.0", "not-a-version"] {
            let err = PluginAdapter::load(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ApiCompatibility);
        }
    }

    #[test]
    fn capabilities_name_one_format() {
        let caps = PluginAdapter::load("1.0.0").unwrap().capabilities();
        assert!(caps.can_read(FORMAT_NAME));
        assert!(caps.can_write(FORMAT_NAME));
        assert_eq!(caps.read_formats.len(), 1);
        assert!(!caps.can_read("csv"));
    }

    #[test]
    fn manifest_lines() {
        let text = PluginAdapter::load("1.0.0").unwrap().manifest().to_manifest_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name: sygnals-hdf5");
        assert_eq!(lines[2], "sygnals_api: \">=1.0.0,<2.0.0\"");
        assert_eq!(lines[4], "entry_point: sygnals_hdf5::plugin:PluginAdapter");
    }

    #[test]
    fn capability_traits_are_object_safe() {
        let adapter = PluginAdapter::load("1.0.0").unwrap();
        let _reader: &dyn ReaderCapable = &adapter;
        let _writer: &dyn WriterCapable = &adapter;
    }
}
