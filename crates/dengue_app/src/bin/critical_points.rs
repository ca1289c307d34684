use anyhow::Result;
use dengue_core::equilibrium::dengue_equilibria;
use dengue_core::model::VectorDenominator;
use log::info;

fn main() -> Result<()> {
    dengue_app::init_logging();
    let points = dengue_equilibria(VectorDenominator::VectorPopulation)?;
    if points.is_empty() {
        info!("The system has no equilibrium point.");
    }
    for point in &points {
        for line in point.report_lines() {
            println!("{line}");
        }
    }
    Ok(())
}
