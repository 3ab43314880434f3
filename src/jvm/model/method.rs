use crate::jvm::code::{
    BasicBlock, ExceptionEntry, HandlerCoverage, Instruction, LabelGenerator, SynLabel,
    SynLabelGenerator,
};
use crate::jvm::{BinaryName, Error, UnqualifiedName};
use std::collections::HashMap;

/// Method along with its body
///
/// Blocks live in a flat vector (their order is the layout order) and are looked up by label
/// through an index, so back edges and loops need no special treatment.
#[derive(Debug, Clone)]
pub struct Method {
    /// Name of the method
    pub name: UnqualifiedName,

    /// Method descriptor (eg. `(I)V`), kept only for diagnostics and printing
    pub descriptor: String,

    /// Blocks in layout order (the first block is the entry point)
    blocks: Vec<BasicBlock>,

    /// Exception table, highest priority first
    exceptions: Vec<ExceptionEntry>,

    /// Label marking the end of the code, if anything refers to it
    end_label: Option<SynLabel>,

    /// Index of each block in `blocks`
    label_index: HashMap<SynLabel, usize>,

    /// Generator for labels that are not yet used anywhere in the method
    label_generator: SynLabelGenerator,
}

impl Method {
    /// Construct a method, checking that the body forms a well-formed control flow graph
    pub fn new(
        name: UnqualifiedName,
        descriptor: impl Into<String>,
        blocks: Vec<BasicBlock>,
        exceptions: Vec<ExceptionEntry>,
        end_label: Option<SynLabel>,
    ) -> Result<Method, Error> {
        let label_index = Self::check_body(&blocks, &exceptions, end_label)?;
        let label_generator = SynLabelGenerator::after(
            label_index
                .keys()
                .chain(end_label.iter())
                .chain(exceptions.iter().flat_map(|e| [&e.start, &e.end, &e.handler])),
        );
        Ok(Method {
            name,
            descriptor: descriptor.into(),
            blocks,
            exceptions,
            end_label,
            label_index,
            label_generator,
        })
    }

    /// Validate a body, returning the label index
    fn check_body(
        blocks: &[BasicBlock],
        exceptions: &[ExceptionEntry],
        end_label: Option<SynLabel>,
    ) -> Result<HashMap<SynLabel, usize>, Error> {
        if blocks.is_empty() {
            return Err(Error::EmptyMethod);
        }

        let mut label_index: HashMap<SynLabel, usize> = HashMap::new();
        for (idx, block) in blocks.iter().enumerate() {
            if label_index.insert(block.label, idx).is_some() {
                return Err(Error::DuplicateLabel(block.label));
            }
        }
        if let Some(end_label) = end_label {
            if label_index.contains_key(&end_label) {
                return Err(Error::EndLabelIsBlock(end_label));
            }
        }

        for block in blocks {
            match block.terminator() {
                Some(insn) if insn.is_unconditional() => (),
                _ => return Err(Error::MissingTerminator(block.label)),
            }
            let body = &block.instructions[..block.instructions.len() - 1];
            if let Some(insn) = body.iter().find(|insn| insn.is_unconditional()) {
                return Err(Error::TransferBeforeEndOfBlock {
                    block: block.label,
                    instruction: insn.clone(),
                });
            }
            for target in block.successors() {
                if !label_index.contains_key(&target) {
                    return Err(Error::UnknownLabel(target));
                }
            }
        }

        // Checks that all exception labels exist and that ranges are not empty
        HandlerCoverage::new(blocks, exceptions, end_label)?;

        Ok(label_index)
    }

    /// Entry block
    pub fn entry(&self) -> &BasicBlock {
        &self.blocks[0]
    }

    /// Blocks in layout order
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Exception table, highest priority first
    pub fn exceptions(&self) -> &[ExceptionEntry] {
        &self.exceptions
    }

    /// Label marking the end of the code
    pub fn end_label(&self) -> Option<SynLabel> {
        self.end_label
    }

    /// Position of a block in the layout order
    pub fn block_index(&self, label: SynLabel) -> Option<usize> {
        self.label_index.get(&label).copied()
    }

    pub fn block(&self, label: SynLabel) -> Option<&BasicBlock> {
        self.block_index(label).map(|idx| &self.blocks[idx])
    }

    /// Handler coverage of every block under the current layout
    pub fn coverage(&self) -> Result<HandlerCoverage, Error> {
        HandlerCoverage::new(&self.blocks, &self.exceptions, self.end_label)
    }

    /// Label generator producing labels that don't clash with anything in the method
    pub fn label_generator(&self) -> SynLabelGenerator {
        self.label_generator.clone()
    }

    /// Get a fresh label (which is from then on considered part of the method)
    pub fn fresh_label(&mut self) -> SynLabel {
        self.label_generator.fresh_label()
    }

    /// Swap in a new body, returning the old one
    ///
    /// The new body is checked just like a freshly constructed one. Labels handed out by
    /// `label_generator` must be respected, so the generator is passed back in.
    pub fn replace_body(
        &mut self,
        blocks: Vec<BasicBlock>,
        exceptions: Vec<ExceptionEntry>,
        end_label: Option<SynLabel>,
        label_generator: SynLabelGenerator,
    ) -> Result<(Vec<BasicBlock>, Vec<ExceptionEntry>), Error> {
        let label_index = Self::check_body(&blocks, &exceptions, end_label)?;
        self.label_index = label_index;
        self.end_label = end_label;
        self.label_generator = label_generator;
        let old_blocks = std::mem::replace(&mut self.blocks, blocks);
        let old_exceptions = std::mem::replace(&mut self.exceptions, exceptions);
        Ok((old_blocks, old_exceptions))
    }

    /// Name used in diagnostics: `my/pkg/Klass.method(I)V`
    pub fn qualified_name(&self, class: &BinaryName) -> String {
        format!("{}.{}{}", class, self.name, self.descriptor)
    }

    /// Number of explicit `goto` instructions in the body
    pub fn goto_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|block| block.instructions.iter())
            .filter(|insn| matches!(insn, Instruction::Goto(_)))
            .count()
    }
}
