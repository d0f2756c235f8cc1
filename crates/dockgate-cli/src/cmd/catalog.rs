use crate::output::{print_json, print_table};
use dockgate_core::catalog::ActionCatalog;
use dockgate_core::types::{ActionSpec, Invocation, Slot};
use serde::Serialize;

#[derive(Serialize)]
struct ParamRow<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    type_name: &'a str,
    constraint: String,
    default: Option<&'a str>,
}

#[derive(Serialize)]
struct ActionRow<'a> {
    name: &'a str,
    summary: &'a str,
    class: &'a str,
    template: String,
    params: Vec<ParamRow<'a>>,
}

pub fn run(json: bool) -> anyhow::Result<()> {
    let catalog = ActionCatalog::builtin();

    if json {
        let rows: Vec<ActionRow> = catalog
            .iter()
            .map(|spec| ActionRow {
                name: spec.name,
                summary: spec.summary,
                class: spec.class.as_str(),
                template: template(spec),
                params: spec
                    .params
                    .iter()
                    .map(|p| ParamRow {
                        name: p.name,
                        type_name: p.kind.type_name(),
                        constraint: p.kind.describe(),
                        default: p.default,
                    })
                    .collect(),
            })
            .collect();
        return print_json(&rows);
    }

    let rows = catalog
        .iter()
        .map(|spec| {
            let params: Vec<String> = spec
                .params
                .iter()
                .map(|p| match p.default {
                    Some(d) => format!("{}={d}", p.name),
                    None => p.name.to_string(),
                })
                .collect();
            vec![
                spec.name.to_string(),
                spec.class.to_string(),
                params.join(" "),
                template(spec),
            ]
        })
        .collect();
    print_table(&["ACTION", "CLASS", "PARAMS", "RUNS"], rows);
    Ok(())
}

/// `build -t {imageName} .` style rendering of an action's invocation.
fn template(spec: &ActionSpec) -> String {
    match &spec.invocation {
        Invocation::Scaffold => "(write scaffold files)".to_string(),
        Invocation::Runtime(slots) => slots
            .iter()
            .map(|slot| match slot {
                Slot::Lit(s) => s.to_string(),
                Slot::Param(p) => format!("{{{p}}}"),
                Slot::Pair(a, b) => format!("{{{a}}}:{{{b}}}"),
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}
