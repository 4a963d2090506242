//! Turns a compiled program into a render tree
//!
//! `build` is synchronous: nested components become deferred children that
//! load their artifact, resolve their slots with `render_slots`, and expand
//! when the stream reaches them, so markup before a component is written
//! without waiting on it.

use crate::compile::{Directive, Node, Prop, PropValue, SlotFill};
use crate::error::{TrellisError, TrellisResult};
use crate::render::chunk::RenderInstruction;
use crate::render::context::RenderContext;
use crate::render::renderable::{escape_html, Renderable};
use crate::render::slot::{render_slots, SlotValue};
use futures_util::FutureExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Element wrapping server-rendered island markup
pub const ISLAND_TAG: &str = "trellis-island";

/// Values a program can see besides request state
#[derive(Debug, Clone, Default)]
pub struct Scope {
    props: Arc<Map<String, Value>>,
    slots: Arc<HashMap<String, String>>,
}

impl Scope {
    pub fn new(props: Map<String, Value>, slots: HashMap<String, String>) -> Self {
        Self {
            props: Arc::new(props),
            slots: Arc::new(slots),
        }
    }

    pub fn props(&self) -> &Map<String, Value> {
        &self.props
    }
}

/// Resolve a dotted path against request state and props
pub fn lookup(ctx: &RenderContext, scope: &Scope, path: &str) -> Option<Value> {
    let mut parts = path.split('.');
    let head = parts.next()?;

    let (root, rest): (Value, Vec<&str>) = match head {
        "locals" => {
            let key = parts.next()?;
            (ctx.locals.get(key)?, parts.collect())
        }
        "params" => {
            let key = parts.next()?;
            (Value::String(ctx.params.get(key)?.clone()), parts.collect())
        }
        "request" => {
            let key = parts.next()?;
            (ctx.request_value(key)?, parts.collect())
        }
        "props" => {
            let key = parts.next()?;
            (scope.props.get(key)?.clone(), parts.collect())
        }
        name => (scope.props.get(name)?.clone(), parts.collect()),
    };

    rest.into_iter().try_fold(root, |value, key| match value {
        Value::Object(mut map) => map.remove(key),
        Value::Array(mut items) => {
            let index: usize = key.parse().ok()?;
            (index < items.len()).then(|| items.swap_remove(index))
        }
        _ => None,
    })
}

/// Template truthiness
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

fn display_value(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Build the render tree for `nodes`.
///
/// Nodes after a component are built only once the stream reaches them, so
/// they observe locals the component set.
pub fn build(ctx: &RenderContext, nodes: &[Node], scope: &Scope) -> Renderable {
    let mut parts = Vec::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        parts.push(build_node(ctx, node, scope));

        let rest = &nodes[index + 1..];
        if contains_component(node) && !rest.is_empty() {
            let (ctx, scope, rest) = (ctx.clone(), scope.clone(), rest.to_vec());
            parts.push(Renderable::Deferred(
                async move { Ok(build(&ctx, &rest, &scope)) }.boxed(),
            ));
            break;
        }
    }

    match parts.len() {
        0 => Renderable::Empty,
        _ => Renderable::Fragment(parts),
    }
}

fn contains_component(node: &Node) -> bool {
    match node {
        Node::Component { .. } => true,
        Node::If {
            then, otherwise, ..
        } => then.iter().chain(otherwise).any(contains_component),
        Node::Slot { fallback, .. } => fallback.iter().any(contains_component),
        _ => false,
    }
}

fn build_node(ctx: &RenderContext, node: &Node, scope: &Scope) -> Renderable {
    match node {
        Node::Html { value } => Renderable::Html(value.clone()),
        Node::Expr { path, raw } => {
            let text = lookup(ctx, scope, path).map(display_value).unwrap_or_default();
            if *raw {
                Renderable::Html(text)
            } else {
                Renderable::Text(text)
            }
        }
        Node::Slot { name, fallback } => match scope.slots.get(name) {
            Some(content) => Renderable::Html(content.clone()),
            None => build(ctx, fallback, scope),
        },
        Node::Head => Renderable::Instruction(RenderInstruction::Head {
            styles: ctx.styles.to_vec(),
        }),
        Node::If {
            path,
            then,
            otherwise,
        } => {
            if is_truthy(lookup(ctx, scope, path).as_ref()) {
                build(ctx, then, scope)
            } else {
                build(ctx, otherwise, scope)
            }
        }
        Node::Component {
            src,
            props,
            slots,
            client,
        } => {
            let call = ComponentCall {
                src: src.clone(),
                props: resolve_props(ctx, scope, props),
                fills: slots.clone(),
                client: client.clone(),
                caller: scope.clone(),
            };
            let ctx = ctx.clone();
            Renderable::Deferred(async move { call.expand(ctx).await }.boxed())
        }
    }
}

fn resolve_props(ctx: &RenderContext, scope: &Scope, props: &[Prop]) -> Map<String, Value> {
    props
        .iter()
        .map(|prop| {
            let value = match &prop.value {
                PropValue::Literal(s) => Value::String(s.clone()),
                PropValue::Path(path) => lookup(ctx, scope, path).unwrap_or(Value::Null),
            };
            (prop.name.clone(), value)
        })
        .collect()
}

/// One component invocation, captured at build time
struct ComponentCall {
    src: String,
    props: Map<String, Value>,
    fills: Vec<SlotFill>,
    client: Option<String>,
    caller: Scope,
}

impl ComponentCall {
    async fn expand(self, ctx: RenderContext) -> TrellisResult<Renderable> {
        let ctx = ctx.nested()?;
        let artifact = ctx.app.load(&self.src).await?;

        for directive in &artifact.frontmatter {
            match directive {
                Directive::Set { key, value } => {
                    ctx.locals.insert(key.clone(), Value::String(value.clone()));
                }
                Directive::Reroute { path } => {
                    if ctx.is_committed() {
                        return Err(TrellisError::render(format!(
                            "{}: cannot reroute to {} after the response has started",
                            self.src, path
                        )));
                    }
                    let response = ctx
                        .app
                        .reroute(path, &ctx.request, &ctx.locals)
                        .await?;
                    return Ok(Renderable::Response(response));
                }
                other => debug!("{}: {:?} has no effect inside a component", self.src, other),
            }
        }

        // Fills are rendered in the caller's scope
        let slots: HashMap<String, SlotValue> = self
            .fills
            .into_iter()
            .map(|fill| (fill.name.clone(), fill_value(fill.body, self.caller.clone())))
            .collect();
        let rendered = render_slots(&ctx, slots).await?;

        let mut parts: Vec<Renderable> = rendered
            .instructions
            .into_iter()
            .map(Renderable::Instruction)
            .collect();

        let children = rendered
            .children
            .into_iter()
            .map(|(name, slot)| (name, slot.content))
            .collect();
        let body = build(&ctx, &artifact.program, &Scope::new(self.props.clone(), children));

        match self.client {
            Some(directive) => {
                parts.push(Renderable::Instruction(RenderInstruction::HydrationScript));
                parts.push(Renderable::Instruction(RenderInstruction::Directive {
                    directive: directive.clone(),
                }));
                parts.push(Renderable::Html(island_open(
                    &ctx.app.config().asset_url(&self.src),
                    &directive,
                    &self.props,
                )));
                parts.push(body);
                parts.push(Renderable::Html(format!("</{}>", ISLAND_TAG)));
            }
            None => parts.push(body),
        }

        Ok(Renderable::Fragment(parts))
    }
}

/// Slot value for one fill: literal-only bodies are precomputed
fn fill_value(body: Vec<Node>, caller: Scope) -> SlotValue {
    let literal = body.iter().all(|n| matches!(n, Node::Html { .. }));
    if literal {
        let html = body
            .into_iter()
            .filter_map(|n| match n {
                Node::Html { value } => Some(value),
                _ => None,
            })
            .collect::<String>();
        return SlotValue::Rendered(Renderable::Html(html));
    }

    let body = Arc::new(body);
    SlotValue::deferred(move |ctx, _data| {
        let tree = build(&ctx, &body, &caller);
        async move { Ok(tree) }.boxed()
    })
}

fn island_open(component_url: &str, client: &str, props: &Map<String, Value>) -> String {
    let props = Value::Object(props.clone()).to_string();
    format!(
        r#"<{} component-url="{}" client="{}" props="{}">"#,
        ISLAND_TAG,
        escape_html(component_url),
        escape_html(client),
        escape_html(&props)
    )
}
