//! Dynamic SQL statement generation from named templates.
//!
//! A registry maps template names to template strings (or to sets of
//! named sections). A template interleaves literal SQL with
//! interpolation expressions, conditional blocks, iteration blocks and
//! sub-SQL invocations:
//!
//! - Interpolation: `SELECT * FROM users WHERE id = ${user_id}`
//! - Conditionals: `@if(user_id)WHERE id = ${user_id}@endif`, with
//!   `@elif(...)` and `@else` branches
//! - Loops: `@for(u in users, separator=", ")${u.name}@endfor`, or
//!   `@for((value, index) in collection)...@endfor`
//! - Sub-SQL: `@pager(limit=${limit})` expands another section of the
//!   same registry entry, possibly recursively
//!
//! Parameters are integers, strings or json values; member (`a.b`) and
//! index (`a[0]`, `a['k']`) suffixes walk into json. Rendering is plain
//! text concatenation: the engine does not validate, escape or execute
//! the produced SQL.
//!
//! ```
//! use serde_json::json;
//! use sqlgen::{Params, SqlGenerator};
//!
//! let config = json!({
//!     "sqls": {
//!         "get_user_by_id": "SELECT * FROM users WHERE id = ${user_id}",
//!     }
//! });
//! let engine = SqlGenerator::new(&config).unwrap();
//!
//! let mut params = Params::new();
//! params.set("user_id", 1);
//! let sql = engine.render("get_user_by_id", params).unwrap();
//! assert_eq!(sql, "SELECT * FROM users WHERE id = 1");
//! ```
//!
//! Templates compile lazily on first use and the compiled form is
//! cached for the lifetime of the engine. The cache uses single-thread
//! interior mutability, so an engine instance stays on the thread that
//! created it; use one engine per thread for parallel rendering.

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::ast::Template;
use crate::eval::Evaluator;
use crate::parser::Parser;

pub use crate::error::{Error, Result};
pub use crate::eval::{Params, Value};

/// The section every registry entry is entered through.
const MAIN_SECTION: &str = "main";

struct CompiledSql {
    root: Template,
    defaults: Params,
}

/// The template registry and rendering engine.
///
/// Owns the registry document, a cache of compiled templates keyed by
/// `(name, section)` and the resolver wiring that lets templates invoke
/// sibling sections of their own entry.
pub struct SqlGenerator {
    sqls: Json,
    cache: RefCell<HashMap<(String, String), Rc<CompiledSql>>>,
}

impl SqlGenerator {
    /// Builds an engine from a configuration object with a `sqls`
    /// member:
    ///
    /// ```text
    /// { "sqls": { "<name>": <entry>, ... } }
    /// entry   := "<template>"
    ///          | { "main": <section>, "<other>": <section>, ... }
    /// section := "<template>"
    ///          | { "sql": "<template>", "params": { "<name>": <default>, ... } }
    /// ```
    pub fn new(config: &Json) -> Result<Self> {
        let sqls = config
            .get("sqls")
            .ok_or_else(|| Error::InvalidConfig("missing \"sqls\" member".to_string()))?;
        if !sqls.is_object() {
            return Err(Error::InvalidConfig(
                "\"sqls\" must be a json object".to_string(),
            ));
        }
        Ok(Self {
            sqls: sqls.clone(),
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Renders the named template with the given parameters.
    ///
    /// Fails if the name is unknown or the template (or any sub-SQL it
    /// reaches) does not compile. Parameter mismatches do not fail;
    /// they render as empty text and are logged.
    pub fn render(&self, name: &str, params: Params) -> Result<String> {
        self.render_section(name, MAIN_SECTION, params)
    }

    /// Renders one section of an entry. `render` is the common entry
    /// point; this is what `@name(...)` resolves through, and is public
    /// for hosts that address auxiliary sections directly.
    pub fn render_section(&self, name: &str, section: &str, mut params: Params) -> Result<String> {
        let compiled = self.compiled(name, section)?;
        params.merge_defaults(&compiled.defaults);
        let resolver = |sub_name: &str, sub_params: Params| -> Result<String> {
            self.render_section(name, sub_name, sub_params)
        };
        let mut evaluator = Evaluator::new(params, &resolver);
        evaluator.render(&compiled.root)
    }

    /// The token stream of a section under a `Tokens for <name>:`
    /// header, one token per line. Debugging aid; the section is lexed
    /// but not compiled.
    pub fn dump_tokens(&self, name: &str, section: &str) -> Result<String> {
        let (source, _) = self.section_source(name, section)?;
        let tokens = lexer::tokenize(&source)?;
        let mut out = format!("Tokens for {name}:\n");
        for token in &tokens {
            out.push_str(&token.to_string());
            out.push('\n');
        }
        Ok(out)
    }

    /// The compiled tree of a section, indented one node per line.
    pub fn dump_ast(&self, name: &str, section: &str) -> Result<String> {
        let compiled = self.compiled(name, section)?;
        Ok(ast::dump(&compiled.root))
    }

    fn compiled(&self, name: &str, section: &str) -> Result<Rc<CompiledSql>> {
        let key = (name.to_string(), section.to_string());
        if let Some(hit) = self.cache.borrow().get(&key) {
            return Ok(Rc::clone(hit));
        }
        let (source, defaults) = self.section_source(name, section)?;
        tracing::debug!("compiling sql template \"{name}\" section \"{section}\"");
        let root = Parser::new(&source)?.parse()?;
        let compiled = Rc::new(CompiledSql { root, defaults });
        self.cache.borrow_mut().insert(key, Rc::clone(&compiled));
        Ok(compiled)
    }

    /// Resolves `(name, section)` to the template source and its
    /// default parameters. A plain-string entry has a single implicit
    /// `main` section and no defaults.
    fn section_source(&self, name: &str, section: &str) -> Result<(String, Params)> {
        let entry = self
            .sqls
            .get(name)
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))?;
        let section_json = match entry {
            Json::String(sql) => {
                return if section == MAIN_SECTION {
                    Ok((sql.clone(), Params::new()))
                } else {
                    Err(Error::UnknownSection {
                        name: name.to_string(),
                        section: section.to_string(),
                    })
                };
            }
            Json::Object(sections) => {
                sections.get(section).ok_or_else(|| Error::UnknownSection {
                    name: name.to_string(),
                    section: section.to_string(),
                })?
            }
            _ => {
                return Err(Error::InvalidSection {
                    name: name.to_string(),
                    section: section.to_string(),
                })
            }
        };
        match section_json {
            Json::String(sql) => Ok((sql.clone(), Params::new())),
            Json::Object(members) => {
                let sql = match members.get("sql") {
                    Some(Json::String(sql)) => sql.clone(),
                    _ => {
                        return Err(Error::InvalidSection {
                            name: name.to_string(),
                            section: section.to_string(),
                        })
                    }
                };
                let mut defaults = Params::new();
                if let Some(Json::Object(default_members)) = members.get("params") {
                    for (param_name, default) in default_members {
                        defaults.set(param_name.clone(), Value::from_json(default.clone()));
                    }
                }
                Ok((sql, defaults))
            }
            _ => Err(Error::InvalidSection {
                name: name.to_string(),
                section: section.to_string(),
            }),
        }
    }
}
