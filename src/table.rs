use crate::expense::{format_decimal, round_to};

/// Won amounts listed in the lookup table, ascending.
pub const KRW_BREAKPOINTS: [u32; 17] = [
    1000, 11000, 12000, 13000, 14000, 15000, 16000, 17000, 18000, 19000, 20000, 25000, 30000,
    35000, 40000, 45000, 50000,
];

const HEADER: &str = "韓元→台幣對照表:";
const TRAILER: &str = "50000 KRW以上 → 請自行乘上匯率";

/// KRW → TWD lookup table at `rate` (TWD per KRW).
pub fn build_conversion_table(rate: f64) -> String {
    let mut table = String::from(HEADER);
    table.push('\n');
    for krw in KRW_BREAKPOINTS {
        let twd = round_to(f64::from(krw) * rate, 2);
        table.push_str(&format!("{} KRW → {} TWD\n", krw, format_decimal(twd)));
    }
    table.push_str(TRAILER);
    table
}
