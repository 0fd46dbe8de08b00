/// Both the sub-GHz (RF09) and the 2.4 GHz (RF24) core are present.
const DUAL_TRX: &str = "dual_trx";

const RF215_META: &[&str] = &[DUAL_TRX];
const RF215M_META: &[&str] = &[];

fn main() {
    let meta = match (cfg!(feature = "rf215"), cfg!(feature = "rf215m")) {
        (true, false) => RF215_META,
        (false, true) => RF215M_META,
        _ => panic!("You must select exactly one transceiver variant."),
    };
    for item in meta {
        println!("cargo:rustc-cfg={item}");
    }
}
