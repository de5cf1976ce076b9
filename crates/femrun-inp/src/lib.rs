//! Keyword deck reader for CalculiX/Abaqus `.inp` files.
//!
//! The CHECK stage uses it to validate a freshly written deck, and tests use
//! it to read constraint semantics back out of generated input.

use thiserror::Error;

/// A parsed deck: its cards in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub cards: Vec<Card>,
}

/// One `*KEYWORD, PARAM=value` header and the data lines up to the next card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Upper-cased keyword as written (`NODE FILE`, `END STEP`)
    pub keyword: String,
    pub parameters: Vec<Parameter>,
    pub data_lines: Vec<String>,
    /// 1-based line of the header
    pub line_start: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl Parameter {
    fn from_item(item: &str) -> Self {
        match item.split_once('=') {
            Some((key, value)) => Self {
                key: key.trim().to_ascii_uppercase(),
                value: Some(value.trim().to_string()),
            },
            None => Self {
                key: item.to_ascii_uppercase(),
                value: None,
            },
        }
    }
}

impl Deck {
    /// Parse deck text. Blank lines and `**` comments are skipped anywhere,
    /// including inside data blocks; a header may continue on following
    /// lines that start with a comma.
    pub fn parse_str(raw: &str) -> Result<Self, ParseError> {
        let mut lines = raw
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with("**"))
            .peekable();
        let mut cards = Vec::new();

        while let Some((line_start, line)) = lines.next() {
            let Some(first) = line.strip_prefix('*') else {
                return Err(ParseError::at(line_start, "expected card starting with '*'"));
            };
            let mut header = first.trim().to_string();
            while let Some((_, more)) = lines.next_if(|(_, l)| l.starts_with(',')) {
                header.push_str(more);
            }

            let mut items = header.split(',').map(str::trim);
            let keyword = items.next().unwrap_or_default();
            if keyword.is_empty() {
                return Err(ParseError::at(line_start, "empty card keyword"));
            }
            let keyword = keyword.to_ascii_uppercase();
            let parameters = items.filter(|item| !item.is_empty()).map(Parameter::from_item).collect();

            let mut data_lines = Vec::new();
            while let Some((_, data)) = lines.next_if(|(_, l)| !l.starts_with('*')) {
                data_lines.push(data.to_string());
            }

            cards.push(Card {
                keyword,
                parameters,
                data_lines,
                line_start,
            });
        }

        Ok(Deck { cards })
    }

    /// All cards whose keyword matches `keyword`, ignoring case, blanks and
    /// underscores (`"END STEP"` matches `*End Step` and `*END_STEP`).
    pub fn cards_named<'a>(&'a self, keyword: &str) -> impl Iterator<Item = &'a Card> + 'a {
        let wanted = normalized(keyword);
        self.cards
            .iter()
            .filter(move |card| normalized(&card.keyword) == wanted)
    }

    pub fn find(&self, keyword: &str) -> Option<&Card> {
        self.cards_named(keyword).next()
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.find(keyword).is_some()
    }
}

impl Card {
    /// Value of a `KEY=value` header parameter, matched case-insensitively.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .and_then(|p| p.value.as_deref())
    }

    /// True for both flag parameters (`NLGEOM`) and valued ones.
    pub fn has_parameter(&self, key: &str) -> bool {
        self.parameters.iter().any(|p| p.key.eq_ignore_ascii_case(key))
    }

    /// Data lines split on commas. A trailing comma does not produce an
    /// empty last field.
    pub fn rows(&self) -> Vec<Vec<&str>> {
        self.data_lines
            .iter()
            .map(|line| {
                let mut fields: Vec<&str> = line.split(',').map(str::trim).collect();
                if fields.last().is_some_and(|f| f.is_empty()) {
                    fields.pop();
                }
                fields
            })
            .collect()
    }

    /// Field `column` of row `row` parsed as `f64`.
    pub fn number(&self, row: usize, column: usize) -> Result<f64, ParseError> {
        let line = self
            .data_lines
            .get(row)
            .ok_or_else(|| ParseError::at(self.line_start, format!("*{} has no data row {row}", self.keyword)))?;
        let field = line.split(',').nth(column).map(str::trim).unwrap_or("");
        field.parse::<f64>().map_err(|_| {
            ParseError::at(
                self.line_start + row + 1,
                format!("*{}: field {column} '{field}' is not a number", self.keyword),
            )
        })
    }
}

fn normalized(keyword: &str) -> String {
    keyword
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect::<String>()
        .to_ascii_uppercase()
}
