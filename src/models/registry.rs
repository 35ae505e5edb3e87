//! Named user functions and plugin models.
//!
//! The registry is filled by the host (when the user defines a function or
//! selects a plugin folder) and then handed to fits by shared reference; fits
//! never modify it.
//!
//! Recursion between user functions is rejected once, at registration, by a
//! cycle check over the call graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{AnalysisError, ErrorKind, Result};
use crate::models::expression::{Ast, ExpressionModel};
use crate::models::model::{FitModel, numeric_gradient};

/// Evaluation entry point of a plugin: `f(x, params)`.
pub type PluginEval = Arc<dyn Fn(f64, &[f64]) -> f64 + Send + Sync>;
/// Gradient entry point of a plugin: fills `∂f/∂p` for one `x`.
pub type PluginGradient = Arc<dyn Fn(f64, &[f64], &mut [f64]) + Send + Sync>;

/// A registered user function `name(x) = expression`.
#[derive(Debug, Clone)]
pub struct UserFunction {
    name: String,
    expression: String,
    parameters: Vec<String>,
    ast: Ast,
}

impl UserFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }
}

/// An externally supplied model.
#[derive(Clone)]
pub struct PluginModel {
    name: String,
    parameter_names: Vec<String>,
    formula: String,
    evaluate: PluginEval,
    gradient: Option<PluginGradient>,
}

impl PluginModel {
    pub fn new(
        name: impl Into<String>,
        parameter_names: Vec<String>,
        formula: impl Into<String>,
        evaluate: PluginEval,
    ) -> Self {
        Self {
            name: name.into(),
            parameter_names,
            formula: formula.into(),
            evaluate,
            gradient: None,
        }
    }

    pub fn with_gradient(mut self, gradient: PluginGradient) -> Self {
        self.gradient = Some(gradient);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PluginModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModel")
            .field("name", &self.name)
            .field("parameter_names", &self.parameter_names)
            .field("formula", &self.formula)
            .field("has_gradient", &self.gradient.is_some())
            .finish()
    }
}

impl FitModel for PluginModel {
    fn label(&self) -> &str {
        &self.name
    }

    fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    fn formula(&self) -> String {
        self.formula.clone()
    }

    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        (self.evaluate)(x, params)
    }

    fn has_gradient(&self) -> bool {
        self.gradient.is_some()
    }

    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]) {
        match &self.gradient {
            Some(g) => g(x, params, out),
            None => numeric_gradient(self, x, params, out),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    functions: BTreeMap<String, UserFunction>,
    plugins: BTreeMap<String, PluginModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a user function.
    ///
    /// Every function it calls must already be registered, and the resulting
    /// call graph must stay acyclic.
    pub fn register_function(
        &mut self,
        name: &str,
        expression: &str,
        parameters: &[String],
    ) -> Result<()> {
        let valid_name = name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_alphanumeric() || c == '_')
            && !matches!(name, "x" | "pi" | "e");
        if !valid_name {
            return Err(AnalysisError::new(
                "Fit",
                ErrorKind::ExpressionError {
                    expression: name.to_string(),
                    message: "invalid function name".to_string(),
                },
            ));
        }

        let ast = Ast::parse(expression)?;
        let mut calls = BTreeSet::new();
        ast.user_calls(&mut calls);
        for callee in &calls {
            if callee != name && !self.functions.contains_key(callee) {
                return Err(AnalysisError::new(
                    "Fit",
                    ErrorKind::UnknownModel {
                        name: callee.clone(),
                    },
                ));
            }
        }
        if let Some(cycle) = self.find_cycle(name, &calls) {
            return Err(AnalysisError::new(
                "Fit",
                ErrorKind::RecursiveDefinitionError {
                    name: name.to_string(),
                    cycle,
                },
            ));
        }

        // Resolve identifiers and arities now rather than at fit time.
        ExpressionModel::from_ast(name, expression, &ast, parameters, self)?;

        debug!(name, expression, callees = calls.len(), "registered user function");
        self.functions.insert(
            name.to_string(),
            UserFunction {
                name: name.to_string(),
                expression: expression.to_string(),
                parameters: parameters.to_vec(),
                ast,
            },
        );
        Ok(())
    }

    /// Depth-first search from `name`'s callees back to `name`.
    fn find_cycle(&self, name: &str, calls: &BTreeSet<String>) -> Option<String> {
        fn visit(
            registry: &ModelRegistry,
            target: &str,
            current: &str,
            path: &mut Vec<String>,
            seen: &mut BTreeSet<String>,
        ) -> bool {
            if current == target {
                return true;
            }
            if !seen.insert(current.to_string()) {
                return false;
            }
            path.push(current.to_string());
            if let Some(f) = registry.functions.get(current) {
                let mut next = BTreeSet::new();
                f.ast.user_calls(&mut next);
                for callee in &next {
                    if visit(registry, target, callee, path, seen) {
                        return true;
                    }
                }
            }
            path.pop();
            false
        }

        let mut seen = BTreeSet::new();
        for callee in calls {
            let mut path = vec![name.to_string()];
            if visit(self, name, callee, &mut path, &mut seen) {
                path.push(name.to_string());
                return Some(path.join(" -> "));
            }
        }
        None
    }

    pub fn register_plugin(&mut self, plugin: PluginModel) {
        debug!(name = plugin.name(), "registered plugin model");
        self.plugins.insert(plugin.name.clone(), plugin);
    }

    pub fn function(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(name)
    }

    /// A registered user function as a fit model.
    pub fn user_model(&self, name: &str) -> Result<ExpressionModel> {
        let f = self.functions.get(name).ok_or_else(|| {
            AnalysisError::new("Fit", ErrorKind::UnknownModel { name: name.to_string() })
        })?;
        ExpressionModel::from_ast(name, &f.expression, &f.ast, &f.parameters, self)
    }

    pub fn plugin(&self, name: &str) -> Result<&PluginModel> {
        self.plugins.get(name).ok_or_else(|| {
            AnalysisError::new("Fit", ErrorKind::UnknownModel { name: name.to_string() })
        })
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}
