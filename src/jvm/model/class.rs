use super::Method;
use crate::jvm::BinaryName;

/// Named collection of methods
#[derive(Debug, Clone)]
pub struct Class {
    pub name: BinaryName,
    pub methods: Vec<Method>,
}

impl Class {
    pub fn new(name: BinaryName) -> Class {
        Class {
            name,
            methods: vec![],
        }
    }
}
