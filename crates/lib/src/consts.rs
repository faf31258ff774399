//! Well-known file and directory names.

/// Build script filename, one per directory level of the source tree.
pub const BUILD_FILENAME: &str = "BUILD";

/// Optional user-level property overrides, read once at the source root.
pub const USER_PROPERTIES: &str = "build.properties";

/// Directory under the build root holding incremental build state.
pub const CACHE_DIR: &str = ".build";

/// Persisted serialized model, relative to the build root.
pub const CACHED_MODEL: &str = ".build/model";

/// Cache blob format version; bumped on incompatible model changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;
