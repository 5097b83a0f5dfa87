//! Tag resolution: the generation-indirection invalidation trick.
//!
//! A tag never tracks which cache entries were derived from it. Instead,
//! every tagged key embeds the tag's current generation token, and
//! invalidating the tag deletes just that token. The next resolution
//! provisions a fresh token, so every key composed under the old
//! generation becomes unreachable in one O(1) delete; the orphaned
//! entries age out via the store's own TTL.
//!
//! The trade is one extra store round trip per tagged read, which is the
//! right direction when reads vastly outnumber invalidations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tagcache_core::{new_token, CacheResult, KeyError};
use tagcache_store::Store;
use tracing::{debug, trace};

use crate::key::{render_template, CallArgs};

/// One tag declaration on a memoizer.
///
/// Evaluated against the call arguments on every tagged call, yielding a
/// concrete tag name such as `user:42`.
#[derive(Clone)]
pub enum TagSpec {
    /// A template with `{0}`/`{name}` placeholders filled from the call
    /// arguments. A constant string (no placeholders) is a constant tag.
    Template(String),
    /// A callable computing the tag name from the call arguments.
    Func(Arc<dyn Fn(&CallArgs) -> String + Send + Sync>),
}

impl TagSpec {
    pub fn template(template: impl Into<String>) -> Self {
        TagSpec::Template(template.into())
    }

    pub fn func(f: impl Fn(&CallArgs) -> String + Send + Sync + 'static) -> Self {
        TagSpec::Func(Arc::new(f))
    }

    fn evaluate(&self, args: &CallArgs) -> Result<String, KeyError> {
        match self {
            TagSpec::Template(template) => render_template(template, args),
            TagSpec::Func(f) => Ok(f(args)),
        }
    }
}

impl fmt::Debug for TagSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagSpec::Template(template) => f.debug_tuple("Template").field(template).finish(),
            TagSpec::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Wrap `base_key` with the current generation token of every tag.
///
/// One batched read fetches all tokens; every missing one is provisioned
/// with a fresh token (written with the entry TTL, so an untouched tag
/// rotates on the same schedule as the entries it qualifies). Tokens are
/// composed in declaration order, never sorted, so one tag set always
/// yields one composite shape.
pub async fn resolve_key<S: Store>(
    store: &S,
    base_key: &str,
    tag_prefix: &str,
    specs: &[TagSpec],
    ttl: Duration,
    args: &CallArgs,
) -> CacheResult<String> {
    let tag_keys: Vec<String> = specs
        .iter()
        .map(|spec| spec.evaluate(args).map(|tag| format!("{tag_prefix}{tag}")))
        .collect::<Result<_, _>>()?;

    let current = store.get_many(&tag_keys).await?;
    let mut tokens = Vec::with_capacity(current.len());
    for (tag_key, slot) in tag_keys.iter().zip(current) {
        match slot {
            Some(Value::String(token)) => tokens.push(token),
            // Miss, or a token someone else wrote in a shape we cannot
            // use: provision a fresh generation before composing.
            _ => {
                let token = new_token();
                debug!(%tag_key, %token, "provisioning tag generation");
                store
                    .set(tag_key, &Value::String(token.clone()), ttl)
                    .await?;
                tokens.push(token);
            }
        }
    }

    let composite = format!("{base_key}|{}", tokens.join("-"));
    trace!(%base_key, %composite, "resolved tagged key");
    Ok(composite)
}

/// Invalidate a tag: delete its generation token. This is the entire
/// invalidation action; no dependent entry is touched.
pub async fn invalidate_tag<S: Store>(store: &S, tag_prefix: &str, tag: &str) -> CacheResult<()> {
    let tag_key = format!("{tag_prefix}{tag}");
    debug!(%tag_key, "invalidating tag");
    store.delete(std::slice::from_ref(&tag_key)).await?;
    Ok(())
}
