//! Splits query text into pipeline stages

use crate::error::ParseError;

/// One pipe-delimited segment of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// 1-based position in the pipeline
    pub position: usize,
    pub command: String,
    /// Raw argument text, before template rendering and tokenization
    pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stage> {
        self.stages.iter()
    }
}

#[derive(Default)]
struct QuoteState {
    single: bool,
    double: bool,
    escaped: bool,
}

impl QuoteState {
    /// Feed one character; returns true when it is outside any quoting
    fn feed(&mut self, c: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        match c {
            '\\' if !self.single => {
                self.escaped = true;
                false
            }
            '\'' if !self.double => {
                self.single = !self.single;
                false
            }
            '"' if !self.single => {
                self.double = !self.double;
                false
            }
            _ => !self.single && !self.double,
        }
    }

    fn is_open(&self) -> bool {
        self.single || self.double || self.escaped
    }
}

/// Split on `|` outside quotes and escapes; pieces are trimmed
pub fn split_stages(query: &str) -> Result<Vec<String>, ParseError> {
    if query.trim().is_empty() {
        return Err(ParseError::EmptyQuery);
    }

    let mut stages = Vec::new();
    let mut current = String::new();
    let mut state = QuoteState::default();
    for c in query.chars() {
        if state.feed(c) && c == '|' {
            stages.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    if state.is_open() {
        return Err(ParseError::Quoting {
            position: stages.len() + 1,
            message: "missing closing quote".to_string(),
        });
    }
    stages.push(current.trim().to_string());
    Ok(stages)
}

/// Split a stage into its leading command token and the raw text after it
fn split_command(stage: &str) -> (&str, &str) {
    let mut state = QuoteState::default();
    for (i, c) in stage.char_indices() {
        if state.feed(c) && c.is_whitespace() {
            return (&stage[..i], stage[i..].trim());
        }
    }
    (stage, "")
}

/// Parse a query into stages, validating shell quoting of each one
pub fn parse(query: &str) -> Result<Pipeline, ParseError> {
    let mut stages = Vec::new();
    for (index, text) in split_stages(query)?.into_iter().enumerate() {
        let position = index + 1;
        let tokens = shell_words::split(&text).map_err(|e| ParseError::Quoting {
            position,
            message: e.to_string(),
        })?;
        if tokens.is_empty() {
            return Err(ParseError::EmptyStage { position });
        }

        let (head, arguments) = split_command(&text);
        let command = shell_words::split(head)
            .ok()
            .and_then(|t| t.into_iter().next())
            .unwrap_or_else(|| tokens[0].clone());
        stages.push(Stage {
            position,
            command,
            arguments: arguments.to_string(),
        });
    }
    Ok(Pipeline { stages })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_quotes() {
        let stages = split_stages(r#"search msg="a|b" | rename -f 'x|y' -t z | head"#).unwrap();
        assert_eq!(
            stages,
            vec![r#"search msg="a|b""#, "rename -f 'x|y' -t z", "head"]
        );
        let stages = split_stages(r"echo a\|b | head").unwrap();
        assert_eq!(stages, vec![r"echo a\|b", "head"]);
    }

    #[test]
    fn test_parse_extracts_command() {
        let pipeline = parse("search index=test  host=web*|head -n 2").unwrap();
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.stages[0].command, "search");
        assert_eq!(pipeline.stages[0].arguments, "index=test  host=web*");
        assert_eq!(pipeline.stages[1].position, 2);
        assert_eq!(pipeline.stages[1].arguments, "-n 2");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("   "), Err(ParseError::EmptyQuery));
        assert_eq!(parse("search | | head"), Err(ParseError::EmptyStage { position: 2 }));
        assert_eq!(parse("search |"), Err(ParseError::EmptyStage { position: 2 }));
        assert!(matches!(
            parse("search | rename -f 'oops"),
            Err(ParseError::Quoting { position: 2, .. })
        ));
    }
}
