//! Level-stack record assembler.
//!
//! # Invariants
//! - Yields exactly one [`Record`] per level-0 token, in source order.
//! - Memory is bounded by the largest single top-level block.

use crate::parse::{ParseIssue, ParseIssueKind, ParseResult, Parsed, RawToken, Record};

/// Lazy assembler over a token stream.
pub struct Assembler<I> {
    tokens: I,
    stack: Vec<Record>,
    finished: bool,
}

impl<I> Assembler<I>
where
    I: Iterator<Item = ParseResult<Parsed<RawToken>>>,
{
    pub fn new(tokens: I) -> Self {
        Self {
            tokens,
            stack: Vec::new(),
            finished: false,
        }
    }

    /// Borrows the underlying token stream (for progress counters).
    pub fn get_ref(&self) -> &I {
        &self.tokens
    }

    fn push(&mut self, token: RawToken) -> Option<Parsed<Record>> {
        let level = token.level as usize;

        if level == 0 {
            let completed = self.flush();
            self.stack.push(Record::from_token(token));
            return completed.map(Parsed::Item);
        }

        if self.stack.is_empty() {
            return Some(Parsed::Issue(ParseIssue {
                line: token.line,
                kind: ParseIssueKind::OrphanLine { tag: token.tag },
            }));
        }

        let depth = self.stack.len();
        let mut issue = None;
        let effective = if level > depth {
            issue = Some(Parsed::Issue(ParseIssue {
                line: token.line,
                kind: ParseIssueKind::LevelJump {
                    level: token.level,
                    max_expected: u32::try_from(depth).unwrap_or(u32::MAX),
                },
            }));
            depth
        } else {
            level
        };

        self.collapse_to(effective);
        self.stack.push(Record::from_token(token));
        issue
    }

    /// Pops open records until `depth` remain, attaching each to its parent.
    fn collapse_to(&mut self, depth: usize) {
        while self.stack.len() > depth.max(1) {
            let Some(child) = self.stack.pop() else {
                break;
            };
            if let Some(parent) = self.stack.last_mut() {
                parent.push_child(child);
            }
        }
    }

    fn flush(&mut self) -> Option<Record> {
        self.collapse_to(1);
        self.stack.pop()
    }
}

impl<I> Iterator for Assembler<I>
where
    I: Iterator<Item = ParseResult<Parsed<RawToken>>>,
{
    type Item = ParseResult<Parsed<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            match self.tokens.next() {
                None => {
                    self.finished = true;
                    return self.flush().map(|record| Ok(Parsed::Item(record)));
                }
                Some(Err(err)) => {
                    self.finished = true;
                    self.stack.clear();
                    return Some(Err(err));
                }
                Some(Ok(Parsed::Issue(issue))) => return Some(Ok(Parsed::Issue(issue))),
                Some(Ok(Parsed::Item(token))) => {
                    if let Some(event) = self.push(token) {
                        return Some(Ok(event));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Assembler;
    use crate::parse::{ParseIssueKind, Parsed, Record, Tokenizer};
    use std::io::Cursor;

    fn assemble(input: &str) -> Vec<Parsed<Record>> {
        let tokens = Tokenizer::new(Cursor::new(input.as_bytes().to_vec()));
        Assembler::new(tokens)
            .map(|item| item.expect("in-memory reads never fail"))
            .collect()
    }

    fn records(events: Vec<Parsed<Record>>) -> Vec<Record> {
        events
            .into_iter()
            .filter_map(|event| match event {
                Parsed::Item(record) => Some(record),
                Parsed::Issue(_) => None,
            })
            .collect()
    }

    #[test]
    fn builds_one_tree_per_top_level_block() {
        let input = "\
0 @I1@ INDI
1 NAME John /Smith/
1 BIRT
2 DATE 2 OCT 1822
2 PLAC Boston
1 SEX M
0 @F1@ FAM
1 HUSB @I1@
0 TRLR
";
        let records = records(assemble(input));
        assert_eq!(records.len(), 3);

        let person = &records[0];
        assert_eq!(person.tag, "INDI");
        assert_eq!(person.xref.as_deref(), Some("I1"));
        assert_eq!(person.children.len(), 3);
        let birth = person.child("BIRT").unwrap();
        assert_eq!(birth.attribute("DATE"), Some("2 OCT 1822"));
        assert_eq!(birth.attribute("PLAC"), Some("Boston"));
        assert_eq!(person.attribute("SEX"), Some("M"));

        assert_eq!(records[1].child("HUSB").unwrap().pointer(), Some("I1"));
        assert_eq!(records[2].tag, "TRLR");
    }

    #[test]
    fn level_jump_attaches_to_deepest_record() {
        let input = "0 @I1@ INDI\n2 DATE 1900\n1 SEX F\n";
        let events = assemble(input);
        assert!(events.iter().any(|event| matches!(
            event,
            Parsed::Issue(issue) if matches!(issue.kind, ParseIssueKind::LevelJump { level: 2, max_expected: 1 })
        )));

        let records = records(events);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].children.len(), 2);
    }

    #[test]
    fn nested_line_before_first_record_is_orphaned() {
        let events = assemble("1 NAME Nobody\n0 HEAD\n");
        assert!(matches!(
            &events[0],
            Parsed::Issue(issue) if matches!(issue.kind, ParseIssueKind::OrphanLine { .. })
        ));
        assert_eq!(records(events).len(), 1);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(assemble("").is_empty());
    }
}
