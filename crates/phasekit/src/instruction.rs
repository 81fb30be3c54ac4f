//! Instruction language: `name(key:value,...);name(...)`
//!
//! Per-unit metadata carries one instruction string per phase. Parsing turns
//! it into [`Statement`]s; binding resolves each statement's action id (phase
//! scope first, then touchpoint scope) and substitutes `${name}` references
//! from the operand parameters. Either step failing aborts the phase before
//! any action runs.
//!
//! Argument values may hold `${#NN}` escapes (decimal character codes) for
//! characters the grammar reserves; [`encode_value`] produces them.

use crate::action::{BoundAction, SharedAction};
use crate::error::ConfigError;
use crate::params::Parameters;
use crate::phase::Phase;
use crate::touchpoint::Touchpoint;
use std::collections::BTreeMap;
use std::fmt;

/// One `name(key:value,...)` statement, values still unresolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    name: String,
    args: Vec<(String, String)>,
}

impl Statement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw arguments in source order
    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Substitute variables in every argument value
    pub fn resolve_args(&self, params: &Parameters) -> Result<BTreeMap<String, String>, ConfigError> {
        self.args
            .iter()
            .map(|(key, value)| Ok((key.clone(), resolve(value, params)?)))
            .collect()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}:{value}")?;
        }
        f.write_str(")")
    }
}

/// Render statements back into instruction source
pub fn render(statements: &[Statement]) -> String {
    statements
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse an instruction string into statements
///
/// Empty statements (e.g. a trailing `;`) are skipped. Names, keys and values
/// are trimmed.
pub fn parse(source: &str) -> Result<Vec<Statement>, ConfigError> {
    source
        .split(';')
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(parse_statement)
        .collect()
}

fn parse_statement(text: &str) -> Result<Statement, ConfigError> {
    let malformed = |reason| ConfigError::MalformedInstruction {
        statement: text.to_string(),
        reason,
    };

    let (open, close) = match (text.find('('), text.rfind(')')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return Err(malformed("expected 'name(...)'")),
    };
    if !text[close + 1..].trim().is_empty() {
        return Err(malformed("unexpected text after ')'"));
    }

    let name = text[..open].trim();
    if name.is_empty() {
        return Err(malformed("empty action name"));
    }

    let mut statement = Statement::new(name);
    let body = text[open + 1..close].trim();
    if body.is_empty() {
        return Ok(statement);
    }

    for pair in body.split(',') {
        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| malformed("argument without ':'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed("empty argument name"));
        }
        statement.args.push((key.to_string(), value.trim().to_string()));
    }

    Ok(statement)
}

/// Substitute `${name}` references and `${#NN}` escapes, left to right
///
/// Substituted text is not rescanned. A `${` without a closing `}` is kept
/// literally.
pub fn resolve(value: &str, params: &Parameters) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(begin) = rest.find("${") {
        let Some(len) = rest[begin + 2..].find('}') else {
            break;
        };
        let end = begin + 2 + len;
        let name = &rest[begin + 2..end];

        out.push_str(&rest[..begin]);
        if let Some(code) = name.strip_prefix('#') {
            let ch = code
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| ConfigError::InvalidEscape(code.to_string()))?;
            out.push(ch);
        } else {
            let replacement = params
                .get(name)
                .ok_or_else(|| ConfigError::UndefinedVariable(name.to_string()))?;
            log::trace!("Resolved ${{{}}} -> {}", name, replacement);
            out.push_str(replacement);
        }
        rest = &rest[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

const RESERVED: &[char] = &['$', ',', ':', ';', '{', '}', '(', ')'];

/// Escape a literal value so it survives parsing unchanged
pub fn encode_value(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if RESERVED.contains(&ch) {
            out.push_str(&format!("${{#{}}}", u32::from(ch)));
        } else {
            out.push(ch);
        }
    }
    out
}

/// Result of resolving an action id across the phase and touchpoint scopes
#[derive(Debug)]
pub enum ActionLookup {
    Found(SharedAction),
    NotFoundInEitherScope,
}

/// Resolve an action id: phase-local first, then touchpoint-local
pub fn lookup_action(phase: &dyn Phase, touchpoint: &dyn Touchpoint, id: &str) -> ActionLookup {
    if let Some(action) = phase.action(id) {
        return ActionLookup::Found(action);
    }
    match touchpoint.action(id) {
        Some(action) => ActionLookup::Found(action),
        None => ActionLookup::NotFoundInEitherScope,
    }
}

/// Turns instruction source into bound, ready-to-run actions
pub struct InstructionParser<'a> {
    phase: &'a dyn Phase,
    touchpoint: &'a dyn Touchpoint,
}

impl<'a> InstructionParser<'a> {
    pub fn new(phase: &'a dyn Phase, touchpoint: &'a dyn Touchpoint) -> Self {
        Self { phase, touchpoint }
    }

    /// Parse and bind `source` against the operand parameters
    pub fn parse_actions(
        &self,
        source: &str,
        params: &Parameters,
    ) -> Result<Vec<BoundAction>, ConfigError> {
        let statements = parse(source)?;
        self.bind(&statements, params)
    }

    /// Bind already-parsed statements
    ///
    /// Every statement is resolved before anything is returned, so a single
    /// unknown action or undefined variable rejects the whole list.
    pub fn bind(
        &self,
        statements: &[Statement],
        params: &Parameters,
    ) -> Result<Vec<BoundAction>, ConfigError> {
        statements
            .iter()
            .map(|statement| self.bind_statement(statement, params))
            .collect()
    }

    fn bind_statement(
        &self,
        statement: &Statement,
        params: &Parameters,
    ) -> Result<BoundAction, ConfigError> {
        let action = match lookup_action(self.phase, self.touchpoint, statement.name()) {
            ActionLookup::Found(action) => action,
            ActionLookup::NotFoundInEitherScope => {
                return Err(ConfigError::ActionNotFound {
                    action: statement.name().to_string(),
                    phase: self.phase.id().to_string(),
                    touchpoint: self.touchpoint.touchpoint_type().to_string(),
                });
            }
        };

        let mut builder = params.to_builder();
        for (key, value) in statement.resolve_args(params)? {
            builder.insert(key, value);
        }

        Ok(BoundAction::new(statement.name(), action, builder.build()))
    }
}
