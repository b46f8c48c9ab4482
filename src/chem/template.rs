//! Text-template chemistry engine.
//!
//! A deterministic, dependency-free [`ChemistryEngine`] used by the CLI,
//! the tests and the benches. Structures are plain text; a reaction pattern
//! has the form `A.B>>{0}{1}` where the left side lists one required
//! substring per reactant (separated by `.`) and the right side lists
//! product templates with `{n}` placeholders substituted by the n-th
//! reactant's text. The number of product sets equals the number of
//! non-overlapping occurrences of the first template in the first reactant,
//! mirroring a pattern that matches a molecule in more than one place.
//!
//! Two marker conventions make failure paths testable: a product whose text
//! contains `!` fails sanitization, and a reactant whose text contains
//! `#boom#` makes `run_reaction` fail outright.

use std::sync::Arc;

use crate::chem::{
    ChemResult, ChemistryEngine, ChemistryError, CompiledReaction, Structure,
};

/// Textual molecule representation.
struct TextStructure {
    text: String,
}

/// Compiled form of a text template pattern.
struct TextReaction {
    reactant_templates: Vec<String>,
    product_templates: Vec<String>,
}

/// Template-based chemistry engine. Stateless and shareable across threads.
pub struct TemplateChemistry;

impl TemplateChemistry {
    pub fn new() -> Self {
        TemplateChemistry
    }

    /// Creates a structure from its textual form.
    pub fn structure(&self, text: &str) -> Structure {
        Structure::from_handle(Arc::new(TextStructure { text: text.to_string() }))
    }

    /// Returns the text behind a structure created by this engine.
    pub fn text_of(&self, structure: &Structure) -> ChemResult<String> {
        structure
            .downcast::<TextStructure>()
            .map(|s| s.text.clone())
            .ok_or_else(|| ChemistryError::Engine("foreign structure handle".to_string()))
    }

    fn instantiate(template: &str, reactant_texts: &[&str]) -> String {
        let mut product = template.to_string();
        for (slot, text) in reactant_texts.iter().enumerate() {
            product = product.replace(&format!("{{{}}}", slot), text);
        }
        product
    }
}

impl Default for TemplateChemistry {
    fn default() -> Self {
        TemplateChemistry::new()
    }
}

impl ChemistryEngine for TemplateChemistry {
    fn compile_reaction(
        &self,
        pattern: &str,
        expected_reactants: usize,
    ) -> ChemResult<CompiledReaction> {
        let (reactant_part, product_part) = pattern
            .split_once(">>")
            .ok_or_else(|| ChemistryError::InvalidPattern(format!("missing '>>' in {:?}", pattern)))?;

        let reactant_templates: Vec<String> =
            reactant_part.split('.').map(|t| t.trim().to_string()).collect();
        if reactant_templates.iter().any(|t| t.is_empty()) {
            return Err(ChemistryError::InvalidPattern(
                "empty reactant template".to_string(),
            ));
        }

        let product_templates: Vec<String> = product_part
            .split('.')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if product_templates.is_empty() {
            return Err(ChemistryError::InvalidPattern("no product templates".to_string()));
        }

        if reactant_templates.len() != expected_reactants {
            return Err(ChemistryError::ReactantCountMismatch {
                expected: expected_reactants,
                found: reactant_templates.len(),
            });
        }

        Ok(CompiledReaction::new(
            reactant_templates.len(),
            Arc::new(TextReaction { reactant_templates, product_templates }),
        ))
    }

    fn run_reaction(
        &self,
        reaction: &CompiledReaction,
        reactants: &[Structure],
    ) -> ChemResult<Vec<Vec<Structure>>> {
        let compiled = reaction
            .downcast::<TextReaction>()
            .ok_or_else(|| ChemistryError::Engine("foreign reaction handle".to_string()))?;

        if reactants.len() != compiled.reactant_templates.len() {
            return Err(ChemistryError::ReactantCountMismatch {
                expected: compiled.reactant_templates.len(),
                found: reactants.len(),
            });
        }

        let mut texts = Vec::with_capacity(reactants.len());
        for reactant in reactants {
            let text = self.text_of(reactant)?;
            if text.contains("#boom#") {
                return Err(ChemistryError::Engine(format!(
                    "reaction application failed for {:?}",
                    text
                )));
            }
            texts.push(text);
        }
        let text_refs: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();

        // Every reactant must contain its template, otherwise the pattern
        // simply did not match.
        for (template, text) in compiled.reactant_templates.iter().zip(&texts) {
            if !text.contains(template.as_str()) {
                return Ok(Vec::new());
            }
        }

        // One product set per occurrence of the first template in the first
        // reactant.
        let set_count = texts[0].matches(compiled.reactant_templates[0].as_str()).count().max(1);

        let mut product_sets = Vec::with_capacity(set_count);
        for _ in 0..set_count {
            let set: Vec<Structure> = compiled
                .product_templates
                .iter()
                .map(|template| self.structure(&Self::instantiate(template, &text_refs)))
                .collect();
            product_sets.push(set);
        }

        Ok(product_sets)
    }

    fn sanitize(&self, product: &Structure) -> ChemResult<Structure> {
        let text = self.text_of(product)?;
        if text.contains('!') {
            return Err(ChemistryError::Sanitization(text));
        }
        Ok(self.structure(text.trim()))
    }

    fn canonical_form(&self, structure: &Structure) -> ChemResult<String> {
        let text = self.text_of(structure)?;
        let mut chars: Vec<char> = text.chars().collect();
        chars.sort_unstable();
        Ok(chars.into_iter().collect())
    }

    fn render(&self, structure: &Structure) -> String {
        self.text_of(structure).unwrap_or_else(|_| "<foreign structure>".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_checks_reactant_count() {
        let chem = TemplateChemistry::new();
        assert!(chem.compile_reaction("A>>{0}", 1).is_ok());

        let err = chem.compile_reaction("A.B>>{0}{1}", 1).unwrap_err();
        match err {
            ChemistryError::ReactantCountMismatch { expected, found } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_run_reaction_multiple_sets() {
        let chem = TemplateChemistry::new();
        let reaction = chem.compile_reaction("C>>{0}O", 1).unwrap();
        let reactant = chem.structure("CC");

        let sets = chem.run_reaction(&reaction, &[reactant]).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].len(), 1);
        assert_eq!(chem.text_of(&sets[0][0]).unwrap(), "CCO");
    }

    #[test]
    fn test_run_reaction_no_match() {
        let chem = TemplateChemistry::new();
        let reaction = chem.compile_reaction("N>>{0}", 1).unwrap();
        let reactant = chem.structure("CC");

        let sets = chem.run_reaction(&reaction, &[reactant]).unwrap();
        assert!(sets.is_empty());
    }

    #[test]
    fn test_sanitize_rejects_marked_products() {
        let chem = TemplateChemistry::new();
        assert!(chem.sanitize(&chem.structure("CCO")).is_ok());
        assert!(chem.sanitize(&chem.structure("CC!O")).is_err());
    }

    #[test]
    fn test_canonical_form_collapses_permutations() {
        let chem = TemplateChemistry::new();
        let a = chem.canonical_form(&chem.structure("abc")).unwrap();
        let b = chem.canonical_form(&chem.structure("cba")).unwrap();
        assert_eq!(a, b);
    }
}
