//! Engine-kind lookup table.
//!
//! Every supported engine product has a fixed command-line template, the
//! file extension its input must carry, and an optional inline script.
//! Engine identifiers look like `Autodesk.AutoCAD+24_1`; the product
//! token between the vendor prefix and the `+version` suffix is matched
//! exactly against the table. Identifiers that do not follow that shape
//! fall back to a substring match which must hit exactly one product.

use serde::Serialize;

/// Placeholder in command-line templates replaced by the bundle name.
pub const BUNDLE_PLACEHOLDER: &str = "{bundle}";

/// Supported engine products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineKind {
    Max3ds,
    AutoCad,
    Inventor,
    Revit,
}

/// Static attributes of one engine product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTemplate {
    pub kind: EngineKind,
    /// Product token as it appears in engine identifiers.
    pub key: &'static str,
    /// Command line with [`BUNDLE_PLACEHOLDER`] where the bundle name goes.
    pub command_line: &'static str,
    /// Extension (without dot) of the input file the engine opens.
    pub extension: &'static str,
    /// Inline script passed as the `script` setting. May be empty.
    pub script: &'static str,
}

const ENGINE_TABLE: [EngineTemplate; 4] = [
    EngineTemplate {
        kind: EngineKind::Max3ds,
        key: "3dsMax",
        command_line: "$(engine.path)\\3dsmaxbatch.exe -sceneFile \"$(args[inputFile].path)\" $(settings[script].path)",
        extension: "max",
        script: "da = dotNetClass(\"Autodesk.Forge.Sample.DesignAutomation.Max.RuntimeExecute\")\nda.ModifyWindowWidthHeight()\n",
    },
    EngineTemplate {
        kind: EngineKind::AutoCad,
        key: "AutoCAD",
        command_line: "$(engine.path)\\accoreconsole.exe /i \"$(args[inputFile].path)\" /al \"$(appbundles[{bundle}].path)\" /s $(settings[script].path)",
        extension: "dwg",
        script: "(command \"GetXrefDetailsToFile\")\n",
    },
    EngineTemplate {
        kind: EngineKind::Inventor,
        key: "Inventor",
        command_line: "$(engine.path)\\inventorcoreconsole.exe /i \"$(args[inputFile].path)\" /al \"$(appbundles[{bundle}].path)\"",
        extension: "ipt",
        script: "",
    },
    EngineTemplate {
        kind: EngineKind::Revit,
        key: "Revit",
        command_line: "$(engine.path)\\revitcoreconsole.exe /i \"$(args[inputFile].path)\" /al \"$(appbundles[{bundle}].path)\"",
        extension: "rvt",
        script: "",
    },
];

/// Engine identifier could not be mapped to exactly one product.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineKindError {
    #[error("Unsupported engine '{0}'")]
    Unsupported(String),

    #[error("Ambiguous engine '{engine}': matches {matches:?}")]
    Ambiguous {
        engine: String,
        matches: Vec<&'static str>,
    },
}

impl EngineKind {
    /// Resolve an engine identifier to its product template.
    pub fn resolve(engine: &str) -> Result<&'static EngineTemplate, EngineKindError> {
        if let Some(product) = product_token(engine) {
            if let Some(template) = ENGINE_TABLE.iter().find(|t| t.key == product) {
                return Ok(template);
            }
        }

        let matches: Vec<&'static EngineTemplate> = ENGINE_TABLE
            .iter()
            .filter(|t| engine.contains(t.key))
            .collect();

        match matches.as_slice() {
            [single] => Ok(*single),
            [] => Err(EngineKindError::Unsupported(engine.to_string())),
            many => Err(EngineKindError::Ambiguous {
                engine: engine.to_string(),
                matches: many.iter().map(|t| t.key).collect(),
            }),
        }
    }

    /// The static template for this kind.
    pub fn template(self) -> &'static EngineTemplate {
        ENGINE_TABLE
            .iter()
            .find(|t| t.kind == self)
            .unwrap_or(&ENGINE_TABLE[0])
    }
}

impl EngineTemplate {
    /// Command line with the bundle name substituted.
    pub fn command_line_for(&self, bundle_name: &str) -> String {
        self.command_line.replace(BUNDLE_PLACEHOLDER, bundle_name)
    }
}

/// Extract the product token from `Vendor.Product+version`.
fn product_token(engine: &str) -> Option<&str> {
    let (_, rest) = engine.split_once('.')?;
    let (product, _) = rest.split_once('+')?;
    (!product.is_empty()).then_some(product)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_product_token_resolves() {
        let t = EngineKind::resolve("Autodesk.AutoCAD+24_1").unwrap();
        assert_eq!(t.kind, EngineKind::AutoCad);
        assert_eq!(t.extension, "dwg");

        let t = EngineKind::resolve("Autodesk.3dsMax+2024").unwrap();
        assert_eq!(t.kind, EngineKind::Max3ds);
    }

    #[test]
    fn single_substring_match_resolves() {
        for (name, kind) in [
            ("3dsMax", EngineKind::Max3ds),
            ("my-AutoCAD-engine", EngineKind::AutoCad),
            ("Inventor2025", EngineKind::Inventor),
            ("RevitLatest", EngineKind::Revit),
        ] {
            assert_eq!(EngineKind::resolve(name).unwrap().kind, kind);
        }
    }

    #[test]
    fn no_match_is_unsupported() {
        assert_eq!(
            EngineKind::resolve("Autodesk.Maya+2024"),
            Err(EngineKindError::Unsupported("Autodesk.Maya+2024".into()))
        );
    }

    #[test]
    fn two_products_in_one_name_are_rejected() {
        let err = EngineKind::resolve("RevitAutoCAD").unwrap_err();
        match err {
            EngineKindError::Ambiguous { matches, .. } => {
                assert_eq!(matches, vec!["AutoCAD", "Revit"]);
            }
            other => panic!("Expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn command_line_substitutes_bundle_name() {
        let t = EngineKind::AutoCad.template();
        let line = t.command_line_for("XrefAppBundle");
        assert!(line.contains("$(appbundles[XrefAppBundle].path)"));
        assert!(!line.contains(BUNDLE_PLACEHOLDER));
    }

    #[test]
    fn every_kind_has_a_template() {
        for kind in [
            EngineKind::Max3ds,
            EngineKind::AutoCad,
            EngineKind::Inventor,
            EngineKind::Revit,
        ] {
            assert_eq!(kind.template().kind, kind);
        }
    }
}
