//! Recognized configuration function vocabulary
//!
//! Function call sites appear in stack documents as tagged scalars
//! (`!terraform.output vpc dev id`). They are carried through the merge as
//! canonical strings and parsed into this closed enum exactly once, so no
//! other module does string-prefix sniffing.

use std::fmt;

/// A recognized configuration function call.
///
/// `!include` is deliberately absent: it is resolved by the document loader
/// before any merge happens. Unrecognized tags are never parsed into this
/// enum and pass through untouched as opaque tagged values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCall {
    /// `!template <expression>` — render against the merged document
    Template(String),
    /// `!terraform.output <component> [<stack>] <output>`
    TerraformOutput(String),
    /// `!terraform.state <component> [<stack>] <attribute>`
    TerraformState(String),
    /// `!store <store> <key>`
    Store(String),
    /// `!store.get <store> <key>`
    StoreGet(String),
    /// `!exec <command>`
    Exec(String),
    /// `!env <var> [<default>]`
    Env(String),
}

/// Tag names in the recognized set, without the leading `!`.
///
/// Longer tags first so `terraform.output` is matched before any future
/// `terraform` prefix could shadow it.
pub const FUNCTION_TAGS: &[&str] = &[
    "terraform.output",
    "terraform.state",
    "store.get",
    "store",
    "template",
    "exec",
    "env",
];

impl FunctionCall {
    /// Build a call from a tag name (without `!`) and its argument string.
    ///
    /// Returns `None` for tags outside the recognized set.
    pub fn from_tag(tag: &str, args: &str) -> Option<Self> {
        let args = args.trim().to_string();
        match tag {
            "template" => Some(Self::Template(args)),
            "terraform.output" => Some(Self::TerraformOutput(args)),
            "terraform.state" => Some(Self::TerraformState(args)),
            "store" => Some(Self::Store(args)),
            "store.get" => Some(Self::StoreGet(args)),
            "exec" => Some(Self::Exec(args)),
            "env" => Some(Self::Env(args)),
            _ => None,
        }
    }

    /// Parse the canonical string form (`!tag args`).
    ///
    /// Returns `None` for plain strings, the pre-merge `!include`, and
    /// unrecognized `!`-tags.
    pub fn parse_str(value: &str) -> Option<Self> {
        let rest = value.strip_prefix('!')?;
        for tag in FUNCTION_TAGS {
            if let Some(args) = rest.strip_prefix(tag) {
                // Either the bare tag or tag followed by whitespace; reject
                // partial matches like `!environment`.
                if args.is_empty() {
                    return Self::from_tag(tag, "");
                }
                if args.starts_with(char::is_whitespace) {
                    return Self::from_tag(tag, args);
                }
            }
        }
        None
    }

    /// Whether a scalar string is a recognized function call site.
    pub fn is_function_str(value: &str) -> bool {
        Self::parse_str(value).is_some()
    }

    /// Tag name without the leading `!`.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Template(_) => "template",
            Self::TerraformOutput(_) => "terraform.output",
            Self::TerraformState(_) => "terraform.state",
            Self::Store(_) => "store",
            Self::StoreGet(_) => "store.get",
            Self::Exec(_) => "exec",
            Self::Env(_) => "env",
        }
    }

    /// Raw argument string following the tag.
    pub fn args(&self) -> &str {
        match self {
            Self::Template(a)
            | Self::TerraformOutput(a)
            | Self::TerraformState(a)
            | Self::Store(a)
            | Self::StoreGet(a)
            | Self::Exec(a)
            | Self::Env(a) => a,
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args().is_empty() {
            write!(f, "!{}", self.tag())
        } else {
            write!(f, "!{} {}", self.tag(), self.args())
        }
    }
}
