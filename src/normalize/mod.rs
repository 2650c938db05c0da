//! The normalization pipeline: eleven ordered passes rewriting a permissive
//! surface tree into a canonical, fully-qualified, alias-free form. The
//! order is load-bearing; each pass relies on invariants established by the
//! ones before it.

use std::error;
use std::fmt;

use crate::ast::access::Reference;
use crate::parser::Parse;
use crate::source::Source;
use crate::tables::ModuleExports;

pub mod annotations;
pub mod fstring;
pub mod imports;
pub mod qualify;
pub mod returns;
pub mod sys_config;
pub mod typed_dict;

pub use annotations::expand_string_annotations;
pub use fstring::expand_format_string;
pub use imports::{
    expand_relative_imports, expand_type_checking_imports, expand_wildcard_imports,
};
pub use qualify::qualify;
pub use returns::expand_implicit_returns;
pub use sys_config::{replace_platform_specific_code, replace_version_specific_code};
pub use typed_dict::{expand_typed_dictionary_declarations, replace_mypy_extensions_stub};

/// A wildcard import whose module has not been indexed yet. Recoverable:
/// callers may defer the source and retry once the module table fills in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingWildcardImport {
    pub import: Reference,
}

impl fmt::Display for MissingWildcardImport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "wildcard import from unindexed module `{}`", self.import)
    }
}

impl error::Error for MissingWildcardImport {}

/// Pass composition over the injected collaborators.
pub struct Preprocessor<'a> {
    parser: &'a dyn Parse,
    modules: &'a dyn ModuleExports,
}

impl<'a> Preprocessor<'a> {
    pub fn new(parser: &'a dyn Parse, modules: &'a dyn ModuleExports) -> Self {
        Preprocessor { parser, modules }
    }

    /// Eager normalization: wildcard imports from unindexed modules are
    /// left in place rather than failing the source.
    pub fn preprocess(&self, source: Source) -> Source {
        self.run(source, true)
            .expect("forced wildcard expansion cannot fail")
    }

    /// Lazy normalization: `None` when a wildcard import cannot be
    /// expanded yet.
    pub fn try_preprocess(&self, source: Source) -> Option<Source> {
        self.run(source, false).ok()
    }

    fn run(&self, source: Source, force: bool) -> Result<Source, MissingWildcardImport> {
        let source = expand_relative_imports(source);
        let source = expand_string_annotations(self.parser, source);
        let source = expand_format_string(self.parser, source);
        let source = replace_platform_specific_code(source);
        let source = replace_version_specific_code(source);
        let source = expand_type_checking_imports(source);
        let source = expand_wildcard_imports(self.modules, source, force)?;
        let source = qualify(self.parser, source);
        let source = expand_implicit_returns(source);
        let source = replace_mypy_extensions_stub(source);
        let source = expand_typed_dictionary_declarations(source);
        Ok(source)
    }
}
