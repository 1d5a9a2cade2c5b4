//! Resolves a solution into projects and the source files selected by the
//! configured filters.

use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use walkdir::WalkDir;

use crate::config::{Config, ConfigError};
use crate::copy_tree;
use crate::{Language, detect_language};

pub const PROJECT_MARKERS: &[&str] = &["Cargo.toml", "pyproject.toml", "setup.py", "package.json"];

pub(crate) fn is_project_dir(dir: &Path) -> bool {
    PROJECT_MARKERS.iter().any(|m| dir.join(m).is_file())
}

/// The deepest directory between `root/relative` and `root` that holds a
/// project marker, or `root` itself.
pub fn project_dir_of(root: &Path, relative: &Path) -> PathBuf {
    let file = root.join(relative);
    file.ancestors()
        .skip(1)
        .take_while(|dir| dir.starts_with(root))
        .find(|dir| is_project_dir(dir))
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    /// Directory relative to the solution root; empty for a root-level project.
    pub relative_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub project: String,
    pub path: PathBuf,
    /// Solution-relative, `/`-separated.
    pub relative: Utf8PathBuf,
    pub language: Language,
}

#[derive(Debug, Clone)]
pub struct Discovery {
    pub solution_root: PathBuf,
    pub projects: Vec<Project>,
    pub source_files: Vec<SourceFile>,
}

fn walk(root: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || e.path().parent().is_none_or(|dir| {
                    !copy_tree::should_skip_entry(dir, &e.file_name().to_string_lossy())
                })
        })
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!("skipping unreadable entry: {err}");
                None
            }
        })
}

/// Every directory under `solution_root` holding a project marker.
pub fn find_projects(solution_root: &Path) -> Vec<Project> {
    walk(solution_root)
        .filter(|e| e.file_type().is_dir())
        .filter(|e| is_project_dir(e.path()))
        .map(|e| {
            let relative_dir = e
                .path()
                .strip_prefix(solution_root)
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let name = e
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "root".to_string());
            Project { name, relative_dir }
        })
        .collect()
}

fn matches_any(patterns: &[String], candidate: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| glob_match::glob_match(&pattern.replace('\\', "/"), candidate))
}

/// Resolve the configured filters to the projects and source files to mutate.
///
/// Fails when a non-empty project filter matches nothing or when no source
/// file survives the filters.
pub fn discover(config: &Config) -> Result<Discovery, ConfigError> {
    let solution_root = config.solution_root();
    let all_projects = find_projects(&solution_root);
    if all_projects.is_empty() {
        return Err(ConfigError::NoProjects(solution_root));
    }

    let projects: Vec<Project> = if config.project_filters.is_empty() {
        all_projects.clone()
    } else {
        all_projects
            .iter()
            .filter(|p| matches_any(&config.project_filters, &p.name))
            .cloned()
            .collect()
    };
    if projects.is_empty() {
        return Err(ConfigError::ProjectFiltersMatchedNothing(config.project_filters.clone()));
    }

    let mut source_files = Vec::new();
    for entry in walk(&solution_root).filter(|e| e.file_type().is_file()) {
        let Some(language) = detect_language(entry.path()) else {
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(&solution_root) else {
            continue;
        };
        let Some(relative) = Utf8PathBuf::from_path_buf(relative.to_path_buf())
            .ok()
            .map(|p| Utf8PathBuf::from(p.as_str().replace('\\', "/")))
        else {
            tracing::debug!("skipping non UTF-8 path {}", entry.path().display());
            continue;
        };

        // A file belongs to the deepest project containing it.
        let Some(owner) = all_projects
            .iter()
            .filter(|p| relative.as_std_path().starts_with(&p.relative_dir))
            .max_by_key(|p| p.relative_dir.components().count())
        else {
            continue;
        };
        if !projects.contains(owner) {
            continue;
        }
        if !config.source_file_filters.is_empty()
            && !matches_any(&config.source_file_filters, relative.as_str())
        {
            continue;
        }

        source_files.push(SourceFile {
            project: owner.name.clone(),
            path: entry.path().to_path_buf(),
            relative,
            language,
        });
    }

    if source_files.is_empty() {
        return Err(ConfigError::NoSourceFiles);
    }

    tracing::debug!(
        projects = projects.len(),
        files = source_files.len(),
        "resolved source files"
    );
    Ok(Discovery {
        solution_root,
        projects,
        source_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn solution() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("core/src")).unwrap();
        fs::create_dir_all(root.join("core/target/debug")).unwrap();
        fs::create_dir_all(root.join("web/src")).unwrap();
        fs::write(root.join("core/Cargo.toml"), "[package]").unwrap();
        fs::write(root.join("core/src/lib.rs"), "fn a() {}").unwrap();
        fs::write(root.join("core/src/notes.txt"), "not code").unwrap();
        fs::write(root.join("core/target/debug/build.rs"), "fn b() {}").unwrap();
        fs::write(root.join("web/package.json"), "{}").unwrap();
        fs::write(root.join("web/src/index.ts"), "function c() {}").unwrap();
        dir
    }

    #[test]
    fn finds_projects_by_marker() {
        let dir = solution();
        let names: Vec<_> = find_projects(dir.path()).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["core", "web"]);
    }

    #[test]
    fn discovers_all_supported_files_without_filters() {
        let dir = solution();
        let found = discover(&Config::new(dir.path())).unwrap();
        let files: Vec<_> = found.source_files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(files, vec!["core/src/lib.rs", "web/src/index.ts"]);
        assert_eq!(found.source_files[1].project, "web");
        assert_eq!(found.source_files[1].language, Language::TypeScript);
    }

    #[test]
    fn build_named_packages_below_a_project_are_discovered() {
        let dir = solution();
        let root = dir.path();
        fs::create_dir_all(root.join("core/src/build")).unwrap();
        fs::write(root.join("core/src/build/steps.rs"), "fn d() {}").unwrap();
        fs::create_dir_all(root.join("web/dist")).unwrap();
        fs::write(root.join("web/dist/bundle.js"), "function e() {}").unwrap();

        let found = discover(&Config::new(root)).unwrap();
        let files: Vec<_> = found.source_files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(files, vec!["core/src/build/steps.rs", "core/src/lib.rs", "web/src/index.ts"]);
    }

    #[test]
    fn project_filters_restrict_files() {
        let dir = solution();
        let cfg = Config::new(dir.path()).with_project_filters(["co*"]);
        let found = discover(&cfg).unwrap();
        assert_eq!(found.source_files.len(), 1);
        assert_eq!(found.source_files[0].project, "core");
    }

    #[test]
    fn source_filters_accept_backslash_patterns() {
        let dir = solution();
        let cfg = Config::new(dir.path()).with_source_file_filters([r"web\**\*"]);
        let found = discover(&cfg).unwrap();
        assert_eq!(found.source_files.len(), 1);
        assert_eq!(found.source_files[0].relative.as_str(), "web/src/index.ts");
    }

    #[test]
    fn project_dir_is_nearest_marked_ancestor() {
        let dir = solution();
        assert_eq!(
            project_dir_of(dir.path(), Path::new("core/src/lib.rs")),
            dir.path().join("core")
        );
        assert_eq!(project_dir_of(dir.path(), Path::new("loose.rs")), dir.path());
    }

    #[test]
    fn unmatched_project_filter_is_a_config_error() {
        let dir = solution();
        let cfg = Config::new(dir.path()).with_project_filters(["Nope"]);
        assert!(matches!(
            discover(&cfg),
            Err(ConfigError::ProjectFiltersMatchedNothing(_))
        ));
    }

    #[test]
    fn unmatched_source_filter_is_a_config_error() {
        let dir = solution();
        let cfg = Config::new(dir.path()).with_source_file_filters(["docs/**"]);
        assert!(matches!(discover(&cfg), Err(ConfigError::NoSourceFiles)));
    }

    #[test]
    fn solution_without_projects_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("loose.rs"), "fn a() {}").unwrap();
        assert!(matches!(
            discover(&Config::new(dir.path())),
            Err(ConfigError::NoProjects(_))
        ));
    }
}
