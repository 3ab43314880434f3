use super::{Error, ErrorKind};
use crate::jvm::code::{
    BasicBlock, BranchCondition, ExceptionEntry, Instruction, LabelGenerator, Opcode, SynLabel,
    SynLabelGenerator,
};
use crate::jvm::model::{Class, Method};
use crate::jvm::{BinaryName, Name, UnqualifiedName};
use std::collections::HashMap;

/// Line number along with the (comment-stripped, trimmed, non-empty) text on it
type Line<'a> = (usize, &'a str);

/// Parse a listing containing exactly one class
pub fn parse_class(source: &str) -> Result<Class, Error> {
    let mut lines = source
        .lines()
        .enumerate()
        .map(|(idx, text)| (idx + 1, strip_comment(text).trim()))
        .filter(|(_, text)| !text.is_empty());

    let mut class = match lines.next() {
        Some((line, text)) => {
            let tokens = tokenize(text);
            match tokens.as_slice() {
                [directive, name] if directive == ".class" => {
                    let name = BinaryName::from_string(name.clone()).map_err(|msg| Error {
                        line,
                        kind: ErrorKind::MalformedName(msg),
                    })?;
                    Class::new(name)
                }
                _ => {
                    return Err(Error {
                        line,
                        kind: ErrorKind::ExpectedClass,
                    })
                }
            }
        }
        None => {
            return Err(Error {
                line: 0,
                kind: ErrorKind::ExpectedClass,
            })
        }
    };

    while let Some((line, text)) = lines.next() {
        let tokens = tokenize(text);
        match tokens.first().map(String::as_str) {
            Some(".method") => {
                let mut body: Vec<Line> = vec![];
                loop {
                    match lines.next() {
                        Some((_, ".end method")) => break,
                        Some(body_line) => body.push(body_line),
                        None => {
                            return Err(Error {
                                line,
                                kind: ErrorKind::UnterminatedMethod,
                            })
                        }
                    }
                }
                class.methods.push(parse_method(line, &tokens, &body)?);
            }
            Some(directive) if directive.starts_with('.') => {
                return Err(Error {
                    line,
                    kind: ErrorKind::UnexpectedDirective(directive.to_owned()),
                })
            }
            _ => {
                return Err(Error {
                    line,
                    kind: ErrorKind::OutsideMethod,
                })
            }
        }
    }

    Ok(class)
}

/// Strip a trailing `;` comment (ignoring semicolons in string literals)
fn strip_comment(text: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ';' if !in_string => return &text[..idx],
            _ => (),
        }
    }
    text
}

/// Split on whitespace, keeping string literals in one piece
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = vec![];
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// If the name looks like `L<n>`, get `n`
fn numbered_label(name: &str) -> Option<usize> {
    name.strip_prefix('L')
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .filter(|digits| digits.len() == 1 || !digits.starts_with('0'))
        .and_then(|digits| digits.parse().ok())
}

fn parse_method(line: usize, header: &[String], body: &[Line]) -> Result<Method, Error> {
    let (name, descriptor) = match header {
        [_, signature] => match signature.find('(') {
            Some(paren) if paren > 0 => {
                let name = UnqualifiedName::from_string(signature[..paren].to_owned()).map_err(
                    |msg| Error {
                        line,
                        kind: ErrorKind::MalformedName(msg),
                    },
                )?;
                (name, signature[paren..].to_owned())
            }
            _ => {
                return Err(Error {
                    line,
                    kind: ErrorKind::MalformedMethodHeader(signature.clone()),
                })
            }
        },
        _ => {
            return Err(Error {
                line,
                kind: ErrorKind::MalformedMethodHeader(header.join(" ")),
            })
        }
    };

    let mut parser = MethodParser::new(body);
    for (line, text) in body {
        parser.parse_line(*line, text)?;
    }
    let (blocks, exceptions, end_label) = parser.finish(line)?;

    Method::new(name, descriptor, blocks, exceptions, end_label).map_err(|err| Error {
        line,
        kind: ErrorKind::Method(err),
    })
}

struct MethodParser {
    labels: HashMap<String, SynLabel>,
    generator: SynLabelGenerator,

    /// Line on which each label was defined
    defined: HashMap<SynLabel, usize>,

    /// First reference to each label
    referenced: Vec<(usize, String)>,

    blocks: Vec<BasicBlock>,

    /// Block being built (`None` right after an unconditional transfer)
    current: Option<BasicBlock>,

    exceptions: Vec<ExceptionEntry>,
}

impl MethodParser {
    fn new(body: &[Line]) -> MethodParser {
        // Numbered labels keep their number, so fresh labels must come after all of them
        let highest = body
            .iter()
            .flat_map(|(_, text)| tokenize(text))
            .flat_map(|token| {
                let label = token.rsplit(':').next().map(numbered_label);
                let defined = numbered_label(token.trim_end_matches(':'));
                [label.flatten(), defined]
            })
            .flatten()
            .max();
        let start = highest.map_or(SynLabel::START, |n| SynLabel::from_index(n).next());

        MethodParser {
            labels: HashMap::new(),
            generator: SynLabelGenerator::new(start),
            defined: HashMap::new(),
            referenced: vec![],
            blocks: vec![],
            current: None,
            exceptions: vec![],
        }
    }

    fn label(&mut self, name: &str) -> SynLabel {
        if let Some(label) = self.labels.get(name) {
            return *label;
        }
        let label = match numbered_label(name) {
            Some(n) => SynLabel::from_index(n),
            None => self.generator.fresh_label(),
        };
        self.labels.insert(name.to_owned(), label);
        label
    }

    fn label_reference(&mut self, line: usize, name: &str) -> SynLabel {
        if !self.labels.contains_key(name) {
            self.referenced.push((line, name.to_owned()));
        }
        self.label(name)
    }

    fn parse_line(&mut self, line: usize, text: &str) -> Result<(), Error> {
        let tokens = tokenize(text);
        let (first, rest) = match tokens.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };

        if first == ".catch" {
            return self.parse_catch(line, rest);
        } else if first.starts_with('.') {
            return Err(Error {
                line,
                kind: ErrorKind::UnexpectedDirective(first.clone()),
            });
        }

        // Label definition, possibly followed by an instruction on the same line
        if let Some(name) = first.strip_suffix(':') {
            let label = self.label(name);
            if self.defined.insert(label, line).is_some() {
                return Err(Error {
                    line,
                    kind: ErrorKind::DuplicateLabel(name.to_owned()),
                });
            }
            self.start_block(label);
            if !rest.is_empty() {
                self.parse_instruction(line, rest)?;
            }
            Ok(())
        } else {
            self.parse_instruction(line, &tokens)
        }
    }

    /// Start a new block, closing the current one (which then falls through to the new block)
    fn start_block(&mut self, label: SynLabel) {
        if let Some(mut block) = self.current.take() {
            let falls_through = match block.instructions.last() {
                Some(insn) => !insn.is_unconditional(),
                None => true,
            };
            if falls_through {
                block.instructions.push(Instruction::FallThrough(label));
            }
            self.blocks.push(block);
        }
        self.current = Some(BasicBlock::new(label, vec![]));
    }

    fn parse_instruction(&mut self, line: usize, tokens: &[String]) -> Result<(), Error> {
        let (mnemonic, operands) = match tokens.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };
        let bad_operands = || Error {
            line,
            kind: ErrorKind::BadOperands(mnemonic.clone()),
        };

        let instruction = if let Some(condition) = BranchCondition::from_mnemonic(mnemonic) {
            match operands {
                [target] => Instruction::If(condition, self.label_reference(line, target)),
                _ => return Err(bad_operands()),
            }
        } else if let Some(terminal) = Instruction::terminal_from_mnemonic(mnemonic) {
            if !operands.is_empty() {
                return Err(bad_operands());
            }
            terminal
        } else {
            match mnemonic.as_str() {
                "goto" | "goto_w" => match operands {
                    [target] => Instruction::Goto(self.label_reference(line, target)),
                    _ => return Err(bad_operands()),
                },
                "tableswitch" => {
                    let (low, rest) = operands.split_first().ok_or_else(bad_operands)?;
                    let low = parse_int(line, low)?;
                    let (cases, default) = split_default(rest).ok_or_else(bad_operands)?;
                    let targets = cases
                        .iter()
                        .map(|target| self.label_reference(line, target))
                        .collect();
                    Instruction::TableSwitch {
                        default: self.label_reference(line, default),
                        low,
                        targets,
                    }
                }
                "lookupswitch" => {
                    let (cases, default) = split_default(operands).ok_or_else(bad_operands)?;
                    let mut targets = vec![];
                    for case in cases {
                        let (key, target) = case.split_once(':').ok_or_else(bad_operands)?;
                        let key = parse_int(line, key)?;
                        targets.push((key, self.label_reference(line, target)));
                    }
                    targets.sort_by_key(|(key, _)| *key);
                    Instruction::LookupSwitch {
                        default: self.label_reference(line, default),
                        targets,
                    }
                }
                "jsr" | "jsr_w" | "ret" => {
                    return Err(Error {
                        line,
                        kind: ErrorKind::UnsupportedInstruction(mnemonic.clone()),
                    })
                }
                _ => Instruction::Plain(Opcode::with_operands(mnemonic.clone(), operands.to_vec())),
            }
        };

        if self.current.is_none() {
            let label = self.generator.fresh_label();
            self.current = Some(BasicBlock::new(label, vec![]));
        }
        let ends_block = instruction.is_unconditional();
        if let Some(block) = self.current.as_mut() {
            block.instructions.push(instruction);
        }
        if ends_block {
            if let Some(block) = self.current.take() {
                self.blocks.push(block);
            }
        }
        Ok(())
    }

    fn parse_catch(&mut self, line: usize, operands: &[String]) -> Result<(), Error> {
        let malformed = || Error {
            line,
            kind: ErrorKind::MalformedCatch,
        };
        match operands {
            [catch_type, from, start, to, end, using, handler]
                if from == "from" && to == "to" && using == "using" =>
            {
                let catch_type = if catch_type == "all" {
                    None
                } else {
                    Some(
                        BinaryName::from_string(catch_type.clone()).map_err(|msg| Error {
                            line,
                            kind: ErrorKind::MalformedName(msg),
                        })?,
                    )
                };
                let entry = ExceptionEntry {
                    start: self.label_reference(line, start),
                    end: self.label_reference(line, end),
                    handler: self.label_reference(line, handler),
                    catch_type,
                };
                self.exceptions.push(entry);
                Ok(())
            }
            _ => Err(malformed()),
        }
    }

    /// Close off the method body
    #[allow(clippy::type_complexity)]
    fn finish(
        mut self,
        line: usize,
    ) -> Result<(Vec<BasicBlock>, Vec<ExceptionEntry>, Option<SynLabel>), Error> {
        let mut end_label = None;
        if let Some(block) = self.current.take() {
            if block.instructions.is_empty() && !self.blocks.is_empty() {
                end_label = Some(block.label);
            } else {
                return Err(Error {
                    line,
                    kind: ErrorKind::FallsOffEnd,
                });
            }
        }

        if let (Some(end), Some(last)) = (end_label, self.blocks.last()) {
            if last.terminator() == Some(&Instruction::FallThrough(end)) {
                return Err(Error {
                    line,
                    kind: ErrorKind::FallsOffEnd,
                });
            }
        }

        for (reference_line, name) in &self.referenced {
            let defined = self
                .labels
                .get(name)
                .map_or(false, |label| self.defined.contains_key(label));
            if !defined {
                return Err(Error {
                    line: *reference_line,
                    kind: ErrorKind::UnknownLabel(name.clone()),
                });
            }
        }

        Ok((self.blocks, self.exceptions, end_label))
    }
}

fn parse_int(line: usize, text: &str) -> Result<i32, Error> {
    text.parse().map_err(|_| Error {
        line,
        kind: ErrorKind::BadInteger(text.to_owned()),
    })
}

/// Split switch operands of the form `... default LABEL`
fn split_default(operands: &[String]) -> Option<(&[String], &String)> {
    match operands {
        [cases @ .., keyword, default] if keyword == "default" => Some((cases, default)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn comments_and_strings() {
        assert_eq!(strip_comment("ldc \"a;b\" ; comment"), "ldc \"a;b\" ");
        assert_eq!(
            tokenize("ldc \"hello world\"  iconst_0"),
            vec!["ldc", "\"hello world\"", "iconst_0"]
        );
    }

    #[test]
    fn blocks_are_split_on_labels_and_transfers() {
        let class = parse_class(
            "
            .class demo/Blocks
            .method run(I)V
                iload_1
                ifeq L7
                iinc 1 1
            L7:
                return
                nop
                goto L7
            .end method
            ",
        )
        .unwrap();
        assert_eq!(class.name.as_str(), "demo/Blocks");

        let method = &class.methods[0];
        assert_eq!(method.name.as_str(), "run");
        assert_eq!(method.descriptor, "(I)V");

        let l7 = SynLabel::from_index(7);
        let blocks = method.blocks();
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks[0].instructions,
            vec![
                Instruction::Plain(Opcode::new("iload_1")),
                Instruction::If(BranchCondition::from_mnemonic("ifeq").unwrap(), l7),
                Instruction::Plain(Opcode::with_operands(
                    "iinc",
                    vec![String::from("1"), String::from("1")]
                )),
                Instruction::FallThrough(l7),
            ]
        );
        assert_eq!(blocks[1].label, l7);
        assert_eq!(blocks[1].instructions, vec![Instruction::Return]);

        // Synthesized labels don't clash with numbered ones
        assert!(blocks[0].label.index() > 7);
        assert!(blocks[2].label.index() > 7);
        assert_ne!(blocks[0].label, blocks[2].label);
    }

    #[test]
    fn switches_and_catches() {
        let class = parse_class(
            "
            .class demo/Switch
            .method pick(I)I
                iload_1
                lookupswitch 10:Ten 1:One default One
            One:
                iconst_1
                ireturn
            Ten:
                bipush 10
                ireturn
            Handler:
                athrow
            End:
            .catch java/lang/Exception from One to End using Handler
            .catch all from Ten to Handler using One
            .end method
            ",
        )
        .unwrap();

        let method = &class.methods[0];
        let blocks = method.blocks();
        let (one, ten, handler) = (blocks[1].label, blocks[2].label, blocks[3].label);
        assert_eq!(
            blocks[0].terminator(),
            Some(&Instruction::LookupSwitch {
                default: one,
                targets: vec![(1, one), (10, ten)],
            })
        );

        let end = method.end_label().expect("trailing label is the end label");
        assert_eq!(method.exceptions().len(), 2);
        assert_eq!(method.exceptions()[0].end, end);
        assert_eq!(method.exceptions()[0].handler, handler);
        assert_eq!(
            method.exceptions()[0].catch_type,
            Some(BinaryName::EXCEPTION)
        );
        assert_eq!(method.exceptions()[1].catch_type, None);
        assert_eq!(method.exceptions()[1].handler, one);
    }

    #[test]
    fn errors_carry_lines() {
        let err =
            parse_class(".class a/B\n.method f()V\n  goto Nowhere\n.end method\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.kind, ErrorKind::UnknownLabel(ref name) if name == "Nowhere"));

        let err = parse_class(".class a/B\n.method f()V\n  iconst_0\n.end method\n").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::FallsOffEnd));

        let err = parse_class(".class a/B\n.method f()V\n  jsr L1\nL1:\n  return\n.end method\n")
            .unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.kind, ErrorKind::UnsupportedInstruction(_)));

        let err = parse_class(".method f()V\n").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ExpectedClass));

        let err = parse_class(".class a/B\n.method f()V\n  return\n").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnterminatedMethod));
    }
}
