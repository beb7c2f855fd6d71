//! Canned SIM file responses for CRSM.
//!
//! The guest radio stack reads a handful of elementary files off the SIM at
//! boot (IMSI, ICCID, MSISDN, service tables). The emulated card answers
//! from this fixed table; any other command tuple is a BAD COMMAND.

/// Look up the response for a `CRSM=<command>,<fileid>,<p1>,<p2>,<p3>`
/// argument string.
pub(crate) fn crsm_response(args: &str) -> Option<&'static str> {
    Some(match args {
        // 176 READ BINARY
        "176,12258,0,0,10" => "+CRSM: 144,0,98101430121181157002",
        "176,28433,0,0,1" => "+CRSM: 144,0,55",
        "176,28435,0,0,1" => "+CRSM: 144,0,55",
        "176,28472,0,0,15" => "+CRSM: 144,0,ff30ffff3c003c03000c0000f03f00",
        "176,28438,0,0,2" => "+CRSM: 144,0,0233",
        "176,28436,0,0,20" => "+CRSM: 144,0,416e64726f6964ffffffffffffffffffffffffff",
        "176,28589,0,0,4" => "+CRSM: 144,0,00000003",

        // 178 READ RECORD
        "178,28615,1,4,32" => {
            "+CRSM: 144,0,566f6963656d61696cffffffffffffffffff07915155125740f9ffffffffffff"
        }
        "178,28480,1,4,32" => {
            "+CRSM: 144,0,ffffffffffffffffffffffffffffffffffff07815155255155f4ffffffffffff"
        }
        "178,28617,1,4,4" => "+CRSM: 144,0,01000000",
        "178,28618,1,4,5" => "+CRSM: 144,0,0000000000",
        "178,28613,1,4,24" => {
            "+CRSM: 144,0,43058441aa890affffffffffffffffffffffffffffffffff"
        }

        // 192 GET RESPONSE
        "192,28589,0,0,15" => "+CRSM: 144,0,000000046fad04000aa0aa01020000",
        "192,28618,0,0,15" => "+CRSM: 144,0,0000000a6fca040011a0aa01020105",
        "192,28433,0,0,15" => "+CRSM: 144,0,000000016f11040011a0aa01020000",
        "192,28435,0,0,15" => "+CRSM: 144,0,000000016f13040011a0aa01020000",
        "192,28486,0,0,15" => "+CRSM: 148,4",
        "192,28621,0,0,15" => "+CRSM: 148,4",
        "192,28613,0,0,15" => "+CRSM: 144,0,000000f06fc504000aa0aa01020118",
        "192,28472,0,0,15" => "+CRSM: 144,0,0000000f6f3804001aa0aa01020000",
        "192,28438,0,0,15" => "+CRSM: 144,0,000000026f1604001aa0aa01020000",
        "192,28436,0,0,15" => "+CRSM: 144,0,000000146f1404001aa0aa01020000",
        "192,28615,0,0,15" => "+CRSM: 144,0,000000406fc7040011a0aa01020120",

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_files_answer() {
        assert_eq!(
            crsm_response("176,28436,0,0,20"),
            Some("+CRSM: 144,0,416e64726f6964ffffffffffffffffffffffffff")
        );
        assert_eq!(crsm_response("192,28486,0,0,15"), Some("+CRSM: 148,4"));
    }

    #[test]
    fn test_unknown_tuple_is_rejected() {
        assert_eq!(crsm_response("214,28436,0,0,20"), None);
        assert_eq!(crsm_response(""), None);
    }
}
