use dengue_core::jacobian::dengue_jacobian;
use dengue_core::model::VectorDenominator;

fn main() {
    dengue_app::init_logging();
    let jacobian = dengue_jacobian(VectorDenominator::VectorPopulation);
    for line in jacobian.report_lines() {
        println!("{line}");
    }
}
