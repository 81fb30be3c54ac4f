use crate::ui;
use phasekit::PhaseSet;

/// Print the standard phases in execution order
pub fn run() {
    let phases = PhaseSet::default();
    ui::header("Phases");
    for (i, phase) in phases.phases().iter().enumerate() {
        let implicit = phase
            .implicit_actions()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let detail = if implicit.is_empty() {
            format!("weight {}", phase.weight())
        } else {
            format!("weight {}, runs {implicit}", phase.weight())
        };
        ui::kv(&format!("{}. {}", i + 1, phase.id()), &detail);
    }
}
