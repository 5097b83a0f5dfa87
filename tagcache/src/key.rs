//! Key generation: deterministic mapping from (namespace, identity,
//! arguments) to cache key strings.
//!
//! Keys are stateless value strings; nothing here touches the store. The
//! same identity, namespace and logical arguments always render the same
//! key, which is the whole basis of memoization.

use std::fmt::Display;

use tagcache_core::KeyError;

/// Rendered call arguments, in call order.
///
/// Rust has no keyword arguments, so callers (or the [`ToCallArgs`] tuple
/// impls) render each argument to a string up front: positional values
/// keep their call order, named values carry their name. A single call
/// uses one style or the other; the key strategies reject mixtures they
/// do not support.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<String>,
    named: Vec<(String, String)>,
}

impl CallArgs {
    /// No arguments.
    pub fn none() -> Self {
        Self::default()
    }

    /// Positional arguments, in call order.
    pub fn positional<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        Self {
            positional: values.into_iter().map(|v| v.to_string()).collect(),
            named: Vec::new(),
        }
    }

    /// Named arguments, in declaration order.
    pub fn named<I, N, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Display,
    {
        Self {
            positional: Vec::new(),
            named: pairs
                .into_iter()
                .map(|(n, v)| (n.into(), v.to_string()))
                .collect(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Display) -> Self {
        self.positional.push(value.to_string());
        self
    }

    /// Append a named argument.
    pub fn named_arg(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.named.push((name.into(), value.to_string()));
        self
    }

    pub fn positional_args(&self) -> &[String] {
        &self.positional
    }

    pub fn named_args(&self) -> &[(String, String)] {
        &self.named
    }

    /// Look up a template placeholder: a decimal index into the
    /// positional arguments, or a name into the named ones.
    pub fn lookup(&self, placeholder: &str) -> Option<&str> {
        if let Ok(index) = placeholder.parse::<usize>() {
            self.positional.get(index).map(String::as_str)
        } else {
            self.named
                .iter()
                .find(|(name, _)| name == placeholder)
                .map(|(_, value)| value.as_str())
        }
    }
}

/// Conversion of a typed argument value into rendered [`CallArgs`].
///
/// Implemented for tuples of `Display` types (rendered positionally) and
/// for `CallArgs` itself. Custom argument structs implement this to
/// control their key rendering.
pub trait ToCallArgs {
    fn to_call_args(&self) -> CallArgs;
}

impl ToCallArgs for CallArgs {
    fn to_call_args(&self) -> CallArgs {
        self.clone()
    }
}

impl ToCallArgs for () {
    fn to_call_args(&self) -> CallArgs {
        CallArgs::none()
    }
}

macro_rules! impl_to_call_args_for_tuple {
    ($($name:ident : $index:tt),+) => {
        impl<$($name: Display),+> ToCallArgs for ($($name,)+) {
            fn to_call_args(&self) -> CallArgs {
                CallArgs::positional([$(self.$index.to_string()),+])
            }
        }
    };
}

impl_to_call_args_for_tuple!(A: 0);
impl_to_call_args_for_tuple!(A: 0, B: 1);
impl_to_call_args_for_tuple!(A: 0, B: 1, C: 2);
impl_to_call_args_for_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_to_call_args_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_to_call_args_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

/// How a memoizer renders its base cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// `namespace?:identity|a-b-c` from positional arguments in call
    /// order. Rejects named arguments.
    Positional,
    /// `namespace?:identity|a=1,b=2` from named arguments sorted by name,
    /// so keyword call order does not matter. Rejects positional
    /// arguments.
    Keyword,
    /// A literal template with `{0}`/`{name}` placeholders substituted
    /// from the arguments. The template is the whole key; namespace and
    /// identity are not prepended.
    Template(String),
}

impl KeyStrategy {
    /// Render the base key for one call.
    pub fn base_key(
        &self,
        namespace: Option<&str>,
        identity: &str,
        args: &CallArgs,
    ) -> Result<String, KeyError> {
        match self {
            KeyStrategy::Positional => {
                if !args.named_args().is_empty() {
                    return Err(KeyError::NamedArgsNotSupported);
                }
                Ok(format!(
                    "{}|{}",
                    qualified(namespace, identity),
                    args.positional_args().join("-")
                ))
            }
            KeyStrategy::Keyword => {
                if !args.positional_args().is_empty() {
                    return Err(KeyError::PositionalArgsNotSupported);
                }
                let mut pairs = args.named_args().to_vec();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                let rendered: Vec<String> = pairs
                    .into_iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                Ok(format!(
                    "{}|{}",
                    qualified(namespace, identity),
                    rendered.join(",")
                ))
            }
            KeyStrategy::Template(template) => render_template(template, args),
        }
    }
}

/// One key per argument for the batched path, order-preserving:
/// `namespace?:identity|arg`.
pub fn batch_keys<T: Display>(namespace: Option<&str>, identity: &str, args: &[T]) -> Vec<String> {
    let prefix = qualified(namespace, identity);
    args.iter().map(|arg| format!("{prefix}|{arg}")).collect()
}

fn qualified(namespace: Option<&str>, identity: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}:{identity}"),
        None => identity.to_string(),
    }
}

/// Substitute `{0}`/`{name}` placeholders. `{{` and `}}` are literal
/// braces. Referencing an argument that does not exist at call time is a
/// configuration error, surfaced immediately.
pub(crate) fn render_template(template: &str, args: &CallArgs) -> Result<String, KeyError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut placeholder = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(inner) => placeholder.push(inner),
                        None => {
                            return Err(KeyError::MalformedTemplate {
                                reason: "unclosed '{'".to_string(),
                            })
                        }
                    }
                }
                if placeholder.is_empty() {
                    return Err(KeyError::MalformedTemplate {
                        reason: "empty placeholder; use an index or a name".to_string(),
                    });
                }
                match args.lookup(&placeholder) {
                    Some(value) => out.push_str(value),
                    None => return Err(KeyError::MissingTemplateArg { placeholder }),
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(KeyError::MalformedTemplate {
                        reason: "unmatched '}'".to_string(),
                    });
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
