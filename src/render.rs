//! HTML fragments for issue comments.
//!
//! Upstream answers comment requests with `body_html` already rendered, so
//! the templates only wrap each comment with its author and date. The
//! `body_html` field is inserted as-is; everything else is escaped.

use crate::error::ProxyError;
use minijinja::{context, Environment, UndefinedBehavior, Value};

const COMMENT_TEMPLATE: &str = r#"<div class="comment" id="issuecomment-{{ comment.id }}">
  <div class="comment-header">
    <img class="comment-avatar" src="{{ comment.user.avatar_url }}" alt="" width="36" height="36">
    <a class="comment-author" href="{{ comment.user.html_url }}">{{ comment.user.login }}</a>
    <a class="comment-date" href="{{ comment.html_url }}">commented on {{ comment.created_at | format_date }}</a>
  </div>
  <div class="comment-body">{{ comment.body_html | safe }}</div>
</div>
"#;

const COMMENT_LIST_TEMPLATE: &str =
    r#"{% for comment in comments %}{% include "comment.html" %}{% endfor %}"#;

/// `2014-05-01T02:26:28Z` -> `2014-05-01`
fn format_date(value: Option<String>) -> String {
    value
        .map(|s| s.chars().take(10).collect())
        .unwrap_or_default()
}

pub struct CommentRenderer {
    env: Environment<'static>,
}

impl CommentRenderer {
    pub fn new() -> Result<Self, ProxyError> {
        Self::with_templates(&[
            ("comment.html", COMMENT_TEMPLATE),
            ("comment-list.html", COMMENT_LIST_TEMPLATE),
        ])
    }

    fn with_templates(templates: &[(&'static str, &'static str)]) -> Result<Self, ProxyError> {
        let mut env = Environment::new();
        // Comments from deleted accounts come without a `user` object.
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.add_filter("format_date", format_date);
        for &(name, source) in templates {
            env.add_template(name, source)
                .map_err(|e| ProxyError::Render(format!("template {name} rejected: {e}")))?;
        }
        Ok(Self { env })
    }

    /// Renders an upstream JSON array of comments.
    pub fn render_comment_list(&self, json: &[u8]) -> Result<String, ProxyError> {
        let comments: Vec<serde_json::Value> =
            serde_json::from_slice(json).map_err(|e| ProxyError::Render(e.to_string()))?;
        self.render("comment-list.html", context! { comments => Value::from_serialize(&comments) })
    }

    /// Renders a single upstream comment object.
    pub fn render_comment(&self, json: &[u8]) -> Result<String, ProxyError> {
        let comment: serde_json::Value =
            serde_json::from_slice(json).map_err(|e| ProxyError::Render(e.to_string()))?;
        if !comment.is_object() {
            return Err(ProxyError::Render("expected a comment object".into()));
        }
        self.render("comment.html", context! { comment => Value::from_serialize(&comment) })
    }

    fn render(&self, name: &str, ctx: Value) -> Result<String, ProxyError> {
        self.env
            .get_template(name)
            .and_then(|t| t.render(ctx))
            .map_err(|e| ProxyError::Render(e.to_string()))
    }
}
