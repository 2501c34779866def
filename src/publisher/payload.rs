//! Synthetic payloads published on the stress topic

/// Real-world looking record data used as the published payload
pub const SAMPLE_DATA: &str = concat!(
    "1009|0 Mins|8|102:17978|null[9.6,540,1069[9.8,98,1069[10,684,1069[10.2,58,1069[11,2,1069|11,1245,1070",
    "[11.2,45,1070[11.4,70,1070[11.6,54,1070[11.8,168,1070[12,45,1070|null[1.1,3256,1071[1.18,300,1071",
    "[1.2,2995,1071[1.25,158,1071[1.3,254,1071|null[1.3,700,1072[1.34,41,1072[1.35,836,1072[1.4,22,1072",
    "[1.8,2472,1072|null[5.2,12,1073[5.3,650,1073[5.4,784,1073[5.5,65,1073[5.8,462,1073|null[6.1,100,1074",
    "[6.2,600,1074[6.3,14,1074[6.4,680,1074[6.5,500,1074|null[30,10,1075[34,30,1075[36,11,1075[40,5,1075",
    "[46,12,1075",
);

/// Sample data cut or repeated to exactly `size` characters; 0 keeps it as-is
pub fn sample_payload(size: usize) -> String {
    if size == 0 {
        return SAMPLE_DATA.to_string();
    }
    SAMPLE_DATA.chars().cycle().take(size).collect()
}
