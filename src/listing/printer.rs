use crate::jvm::code::Instruction;
use crate::jvm::model::{Class, Method};
use std::fmt;

/// Displays a class in listing syntax
pub struct ClassListing<'a>(pub &'a Class);

/// Displays a method in listing syntax
pub struct MethodListing<'a>(pub &'a Method);

pub fn print_class(class: &Class) -> String {
    ClassListing(class).to_string()
}

pub fn print_method(method: &Method) -> String {
    MethodListing(method).to_string()
}

impl<'a> fmt::Display for ClassListing<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".class {}", self.0.name)?;
        for method in &self.0.methods {
            writeln!(f)?;
            write!(f, "{}", MethodListing(method))?;
        }
        Ok(())
    }
}

impl<'a> fmt::Display for MethodListing<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = self.0;
        writeln!(f, ".method {}{}", method.name, method.descriptor)?;

        let blocks = method.blocks();
        for (idx, block) in blocks.iter().enumerate() {
            let next = blocks.get(idx + 1).map(|next| next.label);
            writeln!(f, "{}:", block.label)?;
            for insn in &block.instructions {
                match insn {
                    Instruction::FallThrough(target) if Some(*target) == next => (),
                    Instruction::FallThrough(target) => writeln!(f, "    goto {}", target)?,
                    other => writeln!(f, "    {}", other)?,
                }
            }
        }

        if let Some(end) = method.end_label() {
            if method.exceptions().iter().any(|entry| entry.end == end) {
                writeln!(f, "{}:", end)?;
            }
        }

        for entry in method.exceptions() {
            write!(f, ".catch ")?;
            match &entry.catch_type {
                Some(catch_type) => write!(f, "{}", catch_type)?,
                None => write!(f, "all")?,
            }
            writeln!(
                f,
                " from {} to {} using {}",
                entry.start, entry.end, entry.handler
            )?;
        }

        writeln!(f, ".end method")
    }
}

#[cfg(test)]
mod test {
    use crate::listing::parse_class;

    #[test]
    fn prints_what_it_parses() {
        let source = "\
.class demo/Print

.method run(I)V
L0:
    iload_1
    ifne L2
L1:
    iconst_0
    istore_1
    goto L3
L2:
    ldc \"x y\"
    pop
    lookupswitch 1:L1 7:L3 default L1
L3:
    return
L4:
.catch java/lang/RuntimeException from L1 to L4 using L3
.catch all from L0 to L2 using L3
.end method
";
        let class = parse_class(source).unwrap();
        assert_eq!(super::print_class(&class), source);
    }
}
