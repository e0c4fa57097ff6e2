//! SQL identifier parsing for dialect quoting.
//!
//! Column and table references given to the builder are plain strings. This
//! module decides how each string is rendered:
//!
//! - `name`, `schema.table.column`: every part is quoted
//! - `*`, `table.*`: the star stays bare
//! - `expr as alias`: both sides are rendered, joined with `AS`
//! - anything else (function calls, arithmetic, literals): emitted verbatim
//!
//! # Example
//! ```ignore
//! use qorm::Dialect;
//!
//! let pg = Dialect::postgres();
//! assert_eq!(pg.quote("public.users"), r#""public"."users""#);
//! assert_eq!(pg.quote("u.*"), r#""u".*"#);
//! assert_eq!(pg.quote("COUNT(*)"), "COUNT(*)");
//! ```

/// A parsed identifier reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ident<'a> {
    /// Bare `*`.
    Star,
    /// Dotted path; a trailing `*` part is kept unquoted.
    Path(Vec<&'a str>),
    /// `<ident> AS <alias>`.
    Aliased(Box<Ident<'a>>, &'a str),
    /// Expression that must not be touched.
    Raw(&'a str),
}

impl<'a> Ident<'a> {
    /// Parse a reference string.
    pub fn parse(s: &'a str) -> Self {
        let s = s.trim();
        if let Some((expr, alias)) = split_alias(s) {
            let alias = alias.trim();
            if is_plain_part(alias) {
                return Ident::Aliased(Box::new(Ident::parse(expr)), alias);
            }
            return Ident::Raw(s);
        }
        if s == "*" {
            return Ident::Star;
        }

        let parts: Vec<&str> = s.split('.').collect();
        let last = parts.len() - 1;
        let valid = parts
            .iter()
            .enumerate()
            .all(|(i, p)| is_plain_part(p) || (i == last && *p == "*" && last > 0));
        if valid {
            Ident::Path(parts)
        } else {
            Ident::Raw(s)
        }
    }

    /// Render with `quote` as the identifier quote character.
    pub fn render(&self, quote: char) -> String {
        match self {
            Ident::Star => "*".to_string(),
            Ident::Raw(s) => (*s).to_string(),
            Ident::Path(parts) => parts
                .iter()
                .map(|p| if *p == "*" { "*".to_string() } else { quote_part(p, quote) })
                .collect::<Vec<_>>()
                .join("."),
            Ident::Aliased(inner, alias) => {
                format!("{} AS {}", inner.render(quote), quote_part(alias, quote))
            }
        }
    }

    /// The last path segment, which is the key a column comes back under.
    pub fn output_name(&self) -> Option<&'a str> {
        match self {
            Ident::Path(parts) => parts.last().copied().filter(|p| *p != "*"),
            Ident::Aliased(_, alias) => Some(*alias),
            _ => None,
        }
    }
}

/// Quote a single identifier part, doubling embedded quote characters.
pub fn quote_part(part: &str, quote: char) -> String {
    let mut out = String::with_capacity(part.len() + 2);
    out.push(quote);
    for ch in part.chars() {
        if ch == quote {
            out.push(quote);
        }
        out.push(ch);
    }
    out.push(quote);
    out
}

/// Unquoted identifier part: `[A-Za-z_][A-Za-z0-9_$]*`.
fn is_plain_part(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Split `expr as alias` on the last top-level ` as ` (case-insensitive).
fn split_alias(s: &str) -> Option<(&str, &str)> {
    let lower = s.to_ascii_lowercase();
    let idx = lower.rfind(" as ")?;
    let depth: i32 = s[..idx]
        .chars()
        .map(|c| match c {
            '(' => 1,
            ')' => -1,
            _ => 0,
        })
        .sum();
    if depth != 0 {
        return None;
    }
    Some((&s[..idx], &s[idx + 4..]))
}
