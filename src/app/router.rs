//! File-based routing
//!
//! | File | Route |
//! |------|-------|
//! | `pages/index.tmpl` | `/` |
//! | `pages/about.tmpl` | `/about` |
//! | `pages/blog/index.tmpl` | `/blog` |
//! | `pages/blog/[slug].tmpl` | `/blog/:slug` |
//! | `pages/404.tmpl` | fallback when nothing matches |

use hyper::StatusCode;
use std::collections::HashMap;

/// Page rendered when no route matches
pub const NOT_FOUND_PAGE: &str = "404";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

/// A routable page
#[derive(Debug, Clone)]
pub struct Route {
    /// Display pattern, e.g. `/blog/[slug]`
    pub pattern: String,
    /// Template name
    pub file: String,
    segments: Vec<Segment>,
}

impl Route {
    fn from_file(pages_dir: &str, file: &str) -> Option<Self> {
        let relative = file
            .strip_prefix(pages_dir.trim_end_matches('/'))?
            .strip_prefix('/')?
            .strip_suffix(".tmpl")?;

        let mut parts: Vec<&str> = relative.split('/').collect();
        if parts.last() == Some(&"index") {
            parts.pop();
        }

        let segments: Vec<Segment> = parts
            .iter()
            .map(|part| match part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Static(part.to_string()),
            })
            .collect();

        Some(Self {
            pattern: format!("/{}", parts.join("/")),
            file: file.to_string(),
            segments,
        })
    }

    pub fn is_dynamic(&self) -> bool {
        self.param_count() > 0
    }

    fn param_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count()
    }

    fn matches(&self, path_segments: &[&str]) -> Option<HashMap<String, String>> {
        if self.segments.len() != path_segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, actual) in self.segments.iter().zip(path_segments) {
            match segment {
                Segment::Static(expected) if expected == actual => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), actual.to_string());
                }
            }
        }
        Some(params)
    }
}

/// Result of routing one path
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub file: String,
    pub pattern: String,
    pub params: HashMap<String, String>,
    /// 200 for a real match, 404 for the fallback page
    pub status: StatusCode,
}

/// Routes ordered so static routes are tried before dynamic ones
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
    fallback: Option<String>,
}

impl Router {
    /// Build from template names under `pages_dir`
    pub fn from_files(pages_dir: &str, files: &[String]) -> Self {
        let mut router = Router::default();

        for file in files {
            let Some(route) = Route::from_file(pages_dir, file) else {
                continue;
            };
            if route.pattern == format!("/{}", NOT_FOUND_PAGE) {
                router.fallback = Some(route.file);
            } else {
                router.routes.push(route);
            }
        }

        router
            .routes
            .sort_by(|a, b| (a.param_count(), &a.pattern).cmp(&(b.param_count(), &b.pattern)));
        router
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn fallback_file(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Route for `path`, ignoring the fallback page
    pub fn matches(&self, path: &str) -> Option<RouteMatch> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        self.routes.iter().find_map(|route| {
            route.matches(&segments).map(|params| RouteMatch {
                file: route.file.clone(),
                pattern: route.pattern.clone(),
                params,
                status: StatusCode::OK,
            })
        })
    }

    /// The "no route matched" page, if the project has one
    pub fn fallback(&self) -> Option<RouteMatch> {
        self.fallback.as_ref().map(|file| RouteMatch {
            file: file.clone(),
            pattern: format!("/{}", NOT_FOUND_PAGE),
            params: HashMap::new(),
            status: StatusCode::NOT_FOUND,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(files: &[&str]) -> Router {
        let files: Vec<String> = files.iter().map(|s| s.to_string()).collect();
        Router::from_files("pages", &files)
    }

    #[test]
    fn index_and_nested_routes() {
        let router = router(&["pages/index.tmpl", "pages/about.tmpl", "pages/blog/index.tmpl"]);

        assert_eq!(router.matches("/").unwrap().file, "pages/index.tmpl");
        assert_eq!(router.matches("/about").unwrap().file, "pages/about.tmpl");
        assert_eq!(router.matches("/blog/").unwrap().file, "pages/blog/index.tmpl");
        assert!(router.matches("/nope").is_none());
    }

    #[test]
    fn dynamic_segments_capture_params() {
        let router = router(&["pages/blog/[slug].tmpl"]);
        let matched = router.matches("/blog/hello").unwrap();

        assert_eq!(matched.pattern, "/blog/[slug]");
        assert_eq!(matched.params["slug"], "hello");
        assert!(router.matches("/blog/a/b").is_none());
    }

    #[test]
    fn static_routes_win() {
        let router = router(&["pages/blog/[slug].tmpl", "pages/blog/archive.tmpl"]);

        assert_eq!(router.matches("/blog/archive").unwrap().file, "pages/blog/archive.tmpl");
        assert!(router.routes()[1].is_dynamic());
    }

    #[test]
    fn not_found_page_is_fallback_only() {
        let router = router(&["pages/404.tmpl", "pages/index.tmpl"]);

        assert!(router.matches("/404").is_none());
        let fallback = router.fallback().unwrap();
        assert_eq!(fallback.file, "pages/404.tmpl");
        assert_eq!(fallback.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn files_outside_pages_ignored() {
        let router = router(&["components/card.tmpl", "pages/x.txt"]);
        assert!(router.routes().is_empty());
        assert!(router.fallback().is_none());
    }
}
