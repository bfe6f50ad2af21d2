use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

const QUOTED_SPAN_PATTERN: &str = r#"'([^']*)'|"([^"]*)""#;
const VIRTUAL_TABLE_PATTERN: &str = r"#tt[0-9]+";

static QUOTED_SPAN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(QUOTED_SPAN_PATTERN).expect("failed to compile quoted span regex"));
static VIRTUAL_TABLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(VIRTUAL_TABLE_PATTERN).expect("failed to compile virtual table regex")
});

/// Configurable symbol cleanup applied to parsed text before it becomes a value
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCleaner {
    pub delete_tabs: bool,
    pub delete_virtual_table_postfix: bool,
}

impl ValueCleaner {
    pub fn new(delete_tabs: bool, delete_virtual_table_postfix: bool) -> Self {
        Self {
            delete_tabs,
            delete_virtual_table_postfix,
        }
    }

    pub fn clean(&self, text: &str) -> String {
        let mut out: Cow<'_, str> = Cow::Borrowed(text);

        if self.delete_tabs && out.contains('\t') {
            out = Cow::Owned(out.replace('\t', ""));
        }

        if self.delete_virtual_table_postfix {
            if let Cow::Owned(replaced) = VIRTUAL_TABLE_REGEX.replace_all(&out, "#tt") {
                out = Cow::Owned(replaced);
            }
        }

        trim_line_break(&out).to_string()
    }
}

/// Drop one leading and one trailing line break
fn trim_line_break(text: &str) -> &str {
    let text = text
        .strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text);
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Rewrite every quoted span so the outer comma split cannot fragment it:
/// internal commas become spaces and the enclosing quotes are dropped.
pub fn protect_quoted_commas(text: &str) -> Cow<'_, str> {
    QUOTED_SPAN_REGEX.replace_all(text, |caps: &Captures| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|inner| inner.as_str().replace(',', " "))
            .unwrap_or_default()
    })
}
