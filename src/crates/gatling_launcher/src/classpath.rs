use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::args::path_string;
use crate::error::{LauncherError, LauncherResult};

/// Separator used when rendering a classpath for the host platform.
pub const CLASSPATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// File name of the archive that provides the args-file entry point.
pub const HELPER_ARCHIVE: &str = "gatling-args-helper.jar";

/// Source of the build's resolved test classpath.
pub trait TestClasspath {
    /// Resolve the ordered test classpath entries.
    fn test_classpath(&self) -> LauncherResult<Vec<String>>;
}

/// Fixed list of classpath entries handed over by the build layer.
#[derive(Debug, Clone, Default)]
pub struct StaticClasspath {
    entries: Vec<String>,
}

impl StaticClasspath {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }
}

impl TestClasspath for StaticClasspath {
    fn test_classpath(&self) -> LauncherResult<Vec<String>> {
        Ok(self.entries.clone())
    }
}

/// Classpath exported by the build into a file, one entry per line.
///
/// Blank lines and lines starting with `#` are ignored.
#[derive(Debug, Clone)]
pub struct ClasspathFile {
    path: PathBuf,
}

impl ClasspathFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TestClasspath for ClasspathFile {
    fn test_classpath(&self) -> LauncherResult<Vec<String>> {
        let text = fs::read_to_string(&self.path).map_err(|err| {
            LauncherError::dependency(format!("read {}: {err}", self.path.display()))
        })?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect())
    }
}

/// Ordered, de-duplicated classpath. Earlier entries take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classpath {
    entries: Vec<String>,
}

impl Classpath {
    /// Append an entry unless it is already present.
    pub fn push(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<String> for Classpath {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let entries = iter
            .into_iter()
            .filter(|entry| seen.insert(entry.clone()))
            .collect();
        Self { entries }
    }
}

impl fmt::Display for Classpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entries.join(CLASSPATH_SEPARATOR))
    }
}

/// Composes the runtime classpath for the engine.
///
/// Order: test classpath, config folder, launcher location, helper location.
#[derive(Debug, Clone)]
pub struct ClasspathBuilder {
    launcher_location: PathBuf,
    helper_location: PathBuf,
}

impl ClasspathBuilder {
    pub fn new(launcher_location: impl Into<PathBuf>, helper_location: impl Into<PathBuf>) -> Self {
        Self {
            launcher_location: launcher_location.into(),
            helper_location: helper_location.into(),
        }
    }

    /// Use the running executable as the launcher location and the sibling
    /// args-file helper archive as the helper location.
    pub fn from_current_exe() -> LauncherResult<Self> {
        let exe = std::env::current_exe()
            .map_err(|err| LauncherError::dependency(format!("locate launcher: {err}")))?;
        let helper = exe
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(HELPER_ARCHIVE);
        Ok(Self::new(exe, helper))
    }

    pub fn launcher_location(&self) -> &Path {
        &self.launcher_location
    }

    pub fn helper_location(&self) -> &Path {
        &self.helper_location
    }

    pub fn build(&self, source: &dyn TestClasspath, config_folder: &Path) -> LauncherResult<Classpath> {
        let mut classpath: Classpath = source.test_classpath()?.into_iter().collect();
        classpath.push(path_string(config_folder)?);
        classpath.push(path_string(&self.launcher_location)?);
        classpath.push(path_string(&self.helper_location)?);
        Ok(classpath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unresolvable;

    impl TestClasspath for Unresolvable {
        fn test_classpath(&self) -> LauncherResult<Vec<String>> {
            Err(LauncherError::dependency("artifact io.gatling:gatling-app missing"))
        }
    }

    #[test]
    fn build_appends_fixed_entries_in_order() {
        let builder = ClasspathBuilder::new("/opt/launcher", "/opt/helper.jar");
        let source = StaticClasspath::new(["/repo/gatling-app.jar", "/project/target/test-classes"]);

        let classpath = builder.build(&source, Path::new("/project/conf")).unwrap();
        assert_eq!(
            classpath.entries(),
            &[
                "/repo/gatling-app.jar",
                "/project/target/test-classes",
                "/project/conf",
                "/opt/launcher",
                "/opt/helper.jar",
            ]
        );
    }

    #[test]
    fn duplicates_keep_first_position() {
        let builder = ClasspathBuilder::new("/opt/launcher", "/opt/helper.jar");
        let source = StaticClasspath::new(["/a.jar", "/opt/helper.jar", "/a.jar", "/b.jar"]);

        let classpath = builder.build(&source, Path::new("/a.jar")).unwrap();
        assert_eq!(
            classpath.entries(),
            &["/a.jar", "/opt/helper.jar", "/b.jar", "/opt/launcher"]
        );
    }

    #[test]
    fn display_uses_platform_separator() {
        let classpath: Classpath = vec!["x".to_string(), "y".to_string()].into_iter().collect();
        assert_eq!(classpath.to_string(), format!("x{CLASSPATH_SEPARATOR}y"));
    }

    #[test]
    fn resolution_failures_propagate() {
        let builder = ClasspathBuilder::new("/opt/launcher", "/opt/helper.jar");
        let err = builder.build(&Unresolvable, Path::new("/conf")).unwrap_err();
        assert!(matches!(err, LauncherError::DependencyResolution(_)));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_locations_are_path_errors() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let builder = ClasspathBuilder::new(
            Path::new("/opt").join(OsStr::from_bytes(b"launcher-\xfe")),
            "/opt/helper.jar",
        );
        let err = builder
            .build(&StaticClasspath::default(), Path::new("/conf"))
            .unwrap_err();
        assert!(matches!(err, LauncherError::PathResolution { .. }));
    }

    #[test]
    fn classpath_file_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classpath.txt");
        fs::write(&path, "# exported by build\n/a.jar\n\n  /b.jar  \n").unwrap();

        let entries = ClasspathFile::new(&path).test_classpath().unwrap();
        assert_eq!(entries, vec!["/a.jar", "/b.jar"]);
    }

    #[test]
    fn missing_classpath_file_is_a_dependency_error() {
        let err = ClasspathFile::new("/definitely/not/here.txt")
            .test_classpath()
            .unwrap_err();
        assert!(matches!(err, LauncherError::DependencyResolution(_)));
    }
}
