pub const PLATEFLOW_DISPLAY_VERSION: &str = env!("PLATEFLOW_DISPLAY_VERSION");
pub const PLATEFLOW_BUILD_N: &str = env!("PLATEFLOW_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "plateflow {}\nBuild {}\nDNA assembly design to liquid-handler workflow compiler",
        PLATEFLOW_DISPLAY_VERSION, PLATEFLOW_BUILD_N
    )
}
