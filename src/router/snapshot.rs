//! Route table introspection.
//!
//! Nothing here is on the request path; it is meant for startup logs, `--routes` style
//! CLI output and tests.

use serde::Serialize;
use std::collections::BTreeMap;

use super::core::Router;
use super::route::Route;

const HEADERS: [&str; 8] = [
    "#",
    "Path",
    "Methods",
    "Middleware",
    "Handler",
    "Name",
    "Labels",
    "Constraints",
];

/// One row of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSnapshot {
    pub path: String,
    /// Allowed methods, or `["ANY"]` when all nine are allowed
    pub methods: Vec<String>,
    /// Effective middleware chain, group middleware first
    pub middleware: Vec<String>,
    pub handler: String,
    pub name: String,
    pub labels: Vec<String>,
    /// Parameter name to pattern
    pub constraints: BTreeMap<String, String>,
}

impl Router {
    /// Snapshot of every registered route (the default route excluded), sorted by path
    /// and then handler name. `strip_prefix` is removed from handler and middleware names.
    pub fn snapshot(&self, strip_prefix: &str) -> Vec<RouteSnapshot> {
        let mut rows: Vec<RouteSnapshot> = self
            .routes()
            .map(|route| self.snapshot_route(route, strip_prefix))
            .collect();
        rows.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.handler.cmp(&b.handler)));
        rows
    }

    fn snapshot_route(&self, route: &Route, strip_prefix: &str) -> RouteSnapshot {
        let strip = |name: &str| name.strip_prefix(strip_prefix).unwrap_or(name).to_string();
        let methods = if route.allows_any() {
            vec!["ANY".to_string()]
        } else {
            route.methods().iter().map(ToString::to_string).collect()
        };
        RouteSnapshot {
            path: route.path().to_string(),
            methods,
            middleware: self
                .build_chain(route)
                .iter()
                .map(|m| strip(m.name()))
                .collect(),
            handler: strip(route.handler().name()),
            name: route.name().to_string(),
            labels: route.labels().to_vec(),
            constraints: route
                .constraints()
                .map(|(k, c)| (k.to_string(), c.pattern().to_string()))
                .collect(),
        }
    }

    /// Bordered text table of [`snapshot`](Router::snapshot).
    pub fn dump_table(&self, strip_prefix: &str) -> String {
        let rows: Vec<Vec<Vec<String>>> = self
            .snapshot(strip_prefix)
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                vec![
                    vec![(i + 1).to_string()],
                    vec![row.path],
                    row.methods,
                    row.middleware,
                    vec![row.handler],
                    vec![row.name],
                    row.labels,
                    row.constraints
                        .into_iter()
                        .map(|(k, v)| format!("{k}:{v}"))
                        .collect(),
                ]
            })
            .collect();
        render_table(&rows)
    }
}

fn render_table(rows: &[Vec<Vec<String>>]) -> String {
    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (col, cell) in row.iter().enumerate() {
            let longest = cell.iter().map(|l| l.chars().count()).max().unwrap_or(0);
            widths[col] = widths[col].max(longest);
        }
    }

    let border: String = widths.iter().fold(String::from("+"), |mut acc, w| {
        acc.push_str(&"-".repeat(w + 2));
        acc.push('+');
        acc
    });

    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    let header: Vec<Vec<String>> = HEADERS.iter().map(|h| vec![h.to_string()]).collect();
    push_row(&mut out, &header, &widths);
    out.push_str(&border);
    out.push('\n');
    for row in rows {
        push_row(&mut out, row, &widths);
        out.push_str(&border);
        out.push('\n');
    }
    out
}

fn push_row(out: &mut String, row: &[Vec<String>], widths: &[usize]) {
    let height = row.iter().map(Vec::len).max().unwrap_or(0).max(1);
    for line in 0..height {
        out.push('|');
        for (col, cell) in row.iter().enumerate() {
            let text = cell.get(line).map(String::as_str).unwrap_or("");
            let pad = widths[col] - text.chars().count();
            out.push(' ');
            out.push_str(text);
            out.push_str(&" ".repeat(pad + 1));
            out.push('|');
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{Handler, Middleware};
    use http::Method;

    #[test]
    fn test_snapshot_sorted_by_path_then_handler() {
        let mut router = Router::default();
        router
            .add(&[Method::POST], "/b", Handler::named("app::z", |_c| Ok(())))
            .unwrap();
        router
            .add(&[Method::GET], "/b/x", Handler::named("app::a", |_c| Ok(())))
            .unwrap();
        router
            .add(&[Method::GET], "/a", Handler::named("app::m", |_c| Ok(())))
            .unwrap();

        let rows = router.snapshot("app::");
        let order: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.path.as_str(), r.handler.as_str()))
            .collect();
        assert_eq!(order, vec![("/a", "m"), ("/b", "z"), ("/b/x", "a")]);
    }

    #[test]
    fn test_dump_table_layout() {
        let mut router = Router::default();
        router
            .any("/any", |_c| Ok(()))
            .unwrap()
            .use_middleware(Middleware::named("auth", |ctx| ctx.next()))
            .label("json")
            .regexp("id", r"\d+")
            .unwrap();

        let table = router.dump_table("");
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("+---+"));
        assert!(lines[1].contains("| Path"));
        assert!(lines[1].contains("Constraints |"));
        assert!(table.contains("ANY"));
        assert!(table.contains("auth"));
        assert!(table.contains("id:\\d+"));
        // every line of the table has the same width
        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
    }

    #[test]
    fn test_default_route_excluded() {
        let router = Router::default();
        assert!(router.snapshot("").is_empty());
        assert_eq!(router.dump_table("").lines().count(), 3);
    }
}
