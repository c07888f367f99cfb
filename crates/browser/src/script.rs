//! Page-side JavaScript and decoding of its results.
//!
//! Every script resolves elements by [`DomPath`] the same way: `root` is
//! `document.documentElement` and each segment indexes `element.children`.
//! Scripts always return an object so a missing value is never confused with
//! an evaluation failure.

use {
    cartograph_dom::{DomPath, NodeInfo, QueryOutcome},
    serde::Deserialize,
    serde_json::Value,
};

use crate::error::BrowserError;

/// Shared helpers, spliced into every script body.
const PATH_HELPERS: &str = r#"
    const resolvePath = (path) => {
        const parts = String(path).split('/');
        if (parts[0] !== 'root') return null;
        let el = document.documentElement;
        for (const part of parts.slice(1)) {
            const i = Number(part);
            if (!el || !Number.isInteger(i) || i < 0 || i >= el.children.length) return null;
            el = el.children[i];
        }
        return el;
    };
    const pathOf = (el) => {
        const steps = [];
        while (el && el !== document.documentElement) {
            const parent = el.parentElement;
            if (!parent) return null;
            steps.push(Array.prototype.indexOf.call(parent.children, el));
            el = parent;
        }
        if (!el) return null;
        return ['root', ...steps.reverse()].join('/');
    };
"#;

const QUERY_BODY: &str = r#"
    const base = scope === null ? document : resolvePath(scope);
    if (!base) return { error: 'not_found', path: scope };
    let hits;
    try {
        hits = Array.from(base.querySelectorAll(selector));
        if (scope !== null && base.matches(selector)) hits.unshift(base);
    } catch (e) {
        return { error: 'syntax', message: String((e && e.message) || e) };
    }
    const paths = hits.slice(0, limit).map(pathOf).filter((p) => p !== null);
    return { total: hits.length, paths };
"#;

const INSPECT_BODY: &str = r#"
    const el = resolvePath(path);
    if (!el) return { error: 'not_found', path };
    return {
        tag: el.tagName.toLowerCase(),
        id: el.id || null,
        classes: Array.from(el.classList),
        childCount: el.children.length,
    };
"#;

/// `op` is one of highlight, extract, scroll, locate, focus.
const OPERATE_BODY: &str = r#"
    let els;
    if (paths.length) {
        els = paths.map(resolvePath).filter(Boolean);
    } else if (selector !== null) {
        try {
            els = Array.from(document.querySelectorAll(selector));
        } catch (e) {
            return { error: 'syntax', message: String((e && e.message) || e) };
        }
    } else {
        els = [];
    }
    switch (op) {
        case 'highlight': {
            const color = config.color || '#ff6a00';
            for (const el of els) {
                el.style.outline = `2px solid ${color}`;
                el.dataset.cartographHighlight = '1';
            }
            return { affected: els.length, data: null };
        }
        case 'extract': {
            const fields = Array.isArray(config.fields) && config.fields.length ? config.fields : ['text'];
            const rows = els.map((el) => {
                const row = { path: pathOf(el) };
                for (const field of fields) {
                    if (field === 'text') row.text = (el.innerText || el.textContent || '').trim();
                    else if (field === 'html') row.html = el.outerHTML;
                    else row[field] = el.getAttribute(field);
                }
                return row;
            });
            return { affected: els.length, data: rows };
        }
        case 'scroll': {
            const dx = Number(config.x) || 0;
            const dy = config.y === undefined ? (els.length ? 0 : window.innerHeight) : Number(config.y) || 0;
            if (els.length) els[0].scrollIntoView({ behavior: 'instant', block: 'center' });
            if (dx || dy) window.scrollBy(dx, dy);
            return { affected: els.length, data: { x: window.scrollX, y: window.scrollY } };
        }
        case 'locate': {
            const points = els.map((el) => {
                el.scrollIntoView({ behavior: 'instant', block: 'center' });
                const r = el.getBoundingClientRect();
                return { x: r.x + r.width / 2, y: r.y + r.height / 2 };
            });
            return { affected: els.length, data: points };
        }
        case 'focus': {
            if (els.length) els[0].focus();
            return { affected: els.length ? 1 : 0, data: null };
        }
        default:
            return { error: 'operation', message: `unsupported operation ${op}` };
    }
"#;

fn wrap(params: &str, body: &str, args: &[String]) -> String {
    format!(
        "(({params}) => {{{PATH_HELPERS}{body}}})({})",
        args.join(", ")
    )
}

fn js_literal<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, BrowserError> {
    serde_json::to_string(value).map_err(|e| BrowserError::JsEvalFailed(e.to_string()))
}

pub fn query_script(
    scope: Option<&DomPath>,
    selector: &str,
    limit: usize,
) -> Result<String, BrowserError> {
    let scope = scope.map(ToString::to_string);
    Ok(wrap("scope, selector, limit", QUERY_BODY, &[
        js_literal(&scope)?,
        js_literal(selector)?,
        limit.to_string(),
    ]))
}

pub fn inspect_script(path: &DomPath) -> Result<String, BrowserError> {
    Ok(wrap("path", INSPECT_BODY, &[js_literal(&path.to_string())?]))
}

pub fn operate_script(
    op: &str,
    paths: &[DomPath],
    selector: Option<&str>,
    config: &Value,
) -> Result<String, BrowserError> {
    let paths: Vec<String> = paths.iter().map(ToString::to_string).collect();
    let config = if config.is_object() {
        config.clone()
    } else {
        Value::Object(Default::default())
    };
    Ok(wrap("op, paths, selector, config", OPERATE_BODY, &[
        js_literal(op)?,
        js_literal(&paths)?,
        js_literal(&selector)?,
        js_literal(&config)?,
    ]))
}

/// Raise the `{error: ...}` convention as a typed error.
fn check_error(result: &Value, selector: Option<&str>) -> Result<(), BrowserError> {
    let Some(kind) = result.get("error").and_then(Value::as_str) else {
        return Ok(());
    };
    let message = result
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(match kind {
        "syntax" => BrowserError::InvalidSelector {
            selector: selector.unwrap_or_default().to_string(),
            reason: message,
        },
        "not_found" => BrowserError::NodeNotFound(
            result
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        "operation" => BrowserError::InvalidOperation(message),
        other => BrowserError::JsEvalFailed(format!("{other}: {message}")),
    })
}

#[derive(Deserialize)]
struct RawQuery {
    total: usize,
    #[serde(default)]
    paths: Vec<String>,
}

pub fn parse_query(result: &Value, selector: &str) -> Result<QueryOutcome, BrowserError> {
    check_error(result, Some(selector))?;
    let raw: RawQuery = serde_json::from_value(result.clone())
        .map_err(|e| BrowserError::JsEvalFailed(format!("unexpected query result: {e}")))?;
    let paths = raw
        .paths
        .iter()
        .map(|p| {
            p.parse::<DomPath>()
                .map_err(|e| BrowserError::JsEvalFailed(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryOutcome {
        paths,
        total: raw.total,
    })
}

pub fn parse_node_info(result: &Value) -> Result<NodeInfo, BrowserError> {
    check_error(result, None)?;
    serde_json::from_value(result.clone())
        .map_err(|e| BrowserError::JsEvalFailed(format!("unexpected node info: {e}")))
}

/// `affected` count and free-form `data` of an operation script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptOutcome {
    pub affected: usize,
    #[serde(default)]
    pub data: Value,
}

pub fn parse_operation(
    result: &Value,
    selector: Option<&str>,
) -> Result<ScriptOutcome, BrowserError> {
    check_error(result, selector)?;
    serde_json::from_value(result.clone())
        .map_err(|e| BrowserError::JsEvalFailed(format!("unexpected operation result: {e}")))
}

/// Click targets reported by the `locate` operation.
pub fn parse_points(data: &Value) -> Vec<(f64, f64)> {
    data.as_array()
        .map(|points| {
            points
                .iter()
                .filter_map(|p| Some((p["x"].as_f64()?, p["y"].as_f64()?)))
                .collect()
        })
        .unwrap_or_default()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn query_script_embeds_escaped_arguments() {
        let scope: DomPath = "root/1".parse().unwrap();
        let js = query_script(Some(&scope), r#"a[title="x"]"#, 5).unwrap();
        assert!(js.contains(r#"("root/1", "a[title=\"x\"]", 5)"#));
        assert!(js.contains("resolvePath"));

        let js = query_script(None, ".feed", 20).unwrap();
        assert!(js.ends_with(r#"(null, ".feed", 20)"#));
    }

    #[test]
    fn parses_query_result() {
        let out = parse_query(&json!({ "total": 3, "paths": ["root/1/0", "root/1/1"] }), "li")
            .unwrap();
        assert_eq!(out.total, 3);
        assert_eq!(out.paths[1].to_string(), "root/1/1");
    }

    #[test]
    fn syntax_error_becomes_invalid_selector() {
        let err = parse_query(
            &json!({ "error": "syntax", "message": "'div[' is not a valid selector" }),
            "div[",
        )
        .unwrap_err();
        assert!(
            matches!(err, BrowserError::InvalidSelector { ref selector, .. } if selector == "div[")
        );
    }

    #[test]
    fn missing_scope_becomes_node_not_found() {
        let err = parse_query(&json!({ "error": "not_found", "path": "root/4" }), "li").unwrap_err();
        assert!(matches!(err, BrowserError::NodeNotFound(ref p) if p == "root/4"));
    }

    #[test]
    fn parses_node_info() {
        let info = parse_node_info(&json!({
            "tag": "ul",
            "id": null,
            "classes": ["feed"],
            "childCount": 12
        }))
        .unwrap();
        assert_eq!(info.tag, "ul");
        assert_eq!(info.child_count, 12);
        assert!(info.id.is_none());

        let err = parse_node_info(&json!({ "error": "not_found", "path": "root/0/7" })).unwrap_err();
        assert!(matches!(err, BrowserError::NodeNotFound(_)));
    }

    #[test]
    fn operation_results() {
        let out = parse_operation(
            &json!({ "affected": 2, "data": [{ "path": "root/1", "text": "hi" }] }),
            None,
        )
        .unwrap();
        assert_eq!(out.affected, 2);
        assert_eq!(out.data[0]["text"], "hi");

        let err = parse_operation(
            &json!({ "error": "operation", "message": "unsupported operation hover" }),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BrowserError::InvalidOperation(_)));
    }

    #[test]
    fn operate_script_defaults_config_to_object() {
        let js = operate_script("highlight", &[], Some(".card"), &Value::Null).unwrap();
        assert!(js.ends_with(r#"("highlight", [], ".card", {})"#));
    }

    #[test]
    fn points_skip_malformed_entries() {
        let points = parse_points(&json!([{ "x": 10.0, "y": 5.5 }, { "x": "bad" }]));
        assert_eq!(points, vec![(10.0, 5.5)]);
        assert!(parse_points(&Value::Null).is_empty());
    }
}
