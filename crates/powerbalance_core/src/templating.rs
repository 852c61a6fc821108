//! Extension of the Magnets model with additional PF magnets.
//!
//! The stock Magnets model declares six PF magnets. Its source also carries a
//! loop block, hidden from the Modelica compiler inside `<jinja>` comment
//! markers, that declares one extra magnet per entry of `pf_magnets`:
//!
//! ```text
//! /*<jinja>
//! {% for magnet in pf_magnets %}
//!   PFMagnet magnetPF{{ magnet.ID }}(profile = {{ magnet.profile_id }});
//! {% endfor %}
//! </jinja>*/
//! ```
//!
//! Rendering strips the markers and expands the loop for magnets 7 and up.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ParameterError;
use crate::parameters::ParameterSet;
use crate::value::ParamValue;

/// Number of PF magnets the stock Magnets model declares
pub const DEFAULT_PF_MAGNET_COUNT: u32 = 6;

/// Comment markers hiding template blocks from the Modelica compiler
const TEMPLATE_MARKERS: [&str; 4] = ["//<jinja>", "//</jinja>", "/*<jinja>", "</jinja>*/"];

lazy_static! {
    static ref MAGNET_ID_RE: Regex = Regex::new(r"magnetpf([0-9]+)").unwrap();
    static ref FOR_RE: Regex =
        Regex::new(r"(?s)\{%-?\s*for\s+(\w+)\s+in\s+pf_magnets\s*-?%\}(.*?)\{%-?\s*endfor\s*-?%\}").unwrap();
    static ref FIELD_RE: Regex = Regex::new(r"\{\{\s*(\w+)\.(\w+)\s*\}\}").unwrap();
}

/// An additional PF magnet and the combi time table column driving it
#[derive(Debug, Clone, PartialEq)]
pub struct PfMagnet {
    pub id: u32,
    pub profile_id: ParamValue,
}

/// Ids of every PF magnet mentioned in the parameter set
pub fn pf_magnet_ids(parameters: &ParameterSet) -> Result<Vec<u32>, ParameterError> {
    let ids: Vec<u32> = parameters
        .search("magnetpf")
        .iter()
        .filter_map(|name| MAGNET_ID_RE.captures(name))
        .filter_map(|c| c[1].parse().ok())
        .collect();

    if ids.is_empty() {
        return Err(ParameterError::InvalidInput(
            "cannot obtain number of PF magnets from parameter list, no PF magnet parameters found"
                .to_string(),
        ));
    }
    Ok(ids)
}

/// True when the parameter set refers to more magnets than the stock model
pub fn requires_model_extension(parameters: &ParameterSet) -> bool {
    pf_magnet_ids(parameters)
        .map(|ids| ids.iter().any(|&id| id > DEFAULT_PF_MAGNET_COUNT))
        .unwrap_or(false)
}

/// Render the Magnets template for the magnets of a parameter set.
///
/// Each extra magnet reads its combi time table selection from
/// `<prefix>magnetpf<N>.combitimetable`, defaulting to 1. The selection is
/// recorded in the set as a non-Modelica parameter.
pub fn generate_pf_magnets(parameters: &mut ParameterSet, template: &str) -> Result<String, ParameterError> {
    let count = pf_magnet_ids(parameters)?
        .into_iter()
        .max()
        .unwrap_or(DEFAULT_PF_MAGNET_COUNT);

    let prefix = parameters
        .search("magnetpf1")
        .first()
        .and_then(|name| name.split("magnetpf1").next().map(str::to_string))
        .ok_or_else(|| ParameterError::Internal("failed to retrieve prefix to PF magnet parameters".to_string()))?;

    let mut magnets = Vec::new();
    for id in (DEFAULT_PF_MAGNET_COUNT + 1)..=count {
        let key = format!("{prefix}magnetpf{id}.combitimetable");
        let selection = match parameters.search(&key).first() {
            Some(existing) => parameters.get_parameter(existing)?.clone(),
            None => ParamValue::Int(1),
        };
        parameters.add_non_modelica_parameter(&key, selection.clone());
        tracing::debug!("using CombiTimeTablePF{selection} for additional PF magnet {id}");
        magnets.push(PfMagnet {
            id,
            profile_id: selection,
        });
    }

    Ok(render_magnet_template(template, &magnets))
}

/// Strip the template markers and expand every `pf_magnets` loop
pub fn render_magnet_template(template: &str, magnets: &[PfMagnet]) -> String {
    let stripped = TEMPLATE_MARKERS
        .iter()
        .fold(template.to_string(), |text, marker| text.replace(marker, ""));

    FOR_RE
        .replace_all(&stripped, |loop_caps: &regex::Captures<'_>| {
            let variable = &loop_caps[1];
            let body = &loop_caps[2];
            magnets
                .iter()
                .map(|magnet| {
                    FIELD_RE
                        .replace_all(body, |field: &regex::Captures<'_>| {
                            if &field[1] != variable {
                                return field[0].to_string();
                            }
                            match &field[2] {
                                "ID" | "id" => magnet.id.to_string(),
                                "profile_id" => magnet.profile_id.to_string(),
                                _ => field[0].to_string(),
                            }
                        })
                        .into_owned()
                })
                .collect::<String>()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "model Magnets\n  PFMagnet magnetPF6;\n/*<jinja>\n{% for m in pf_magnets %}  PFMagnet magnetPF{{ m.ID }}(profile = {{ m.profile_id }});\n{% endfor %}</jinja>*/\nend Magnets;\n";

    #[test]
    fn renders_one_declaration_per_magnet() {
        let magnets = [
            PfMagnet { id: 7, profile_id: ParamValue::Int(1) },
            PfMagnet { id: 8, profile_id: ParamValue::Int(3) },
        ];
        let rendered = render_magnet_template(TEMPLATE, &magnets);

        assert!(rendered.contains("PFMagnet magnetPF7(profile = 1);"));
        assert!(rendered.contains("PFMagnet magnetPF8(profile = 3);"));
        assert!(!rendered.contains("jinja"));
        assert!(!rendered.contains("{%"));
    }

    #[test]
    fn renders_nothing_for_no_extra_magnets() {
        let rendered = render_magnet_template(TEMPLATE, &[]);
        assert!(!rendered.contains("magnetPF7"));
        assert!(rendered.contains("end Magnets;"));
    }
}
