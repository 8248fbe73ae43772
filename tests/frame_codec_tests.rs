use empire_core::codec::{
    decode, encode, encode_extension, escape_chat_text, unescape_chat_text, Dialect,
};
use serde_json::json;

#[cfg(test)]
mod tests {
    use super::*;

    fn xml_frame(action: &str, body: &str) -> String {
        format!("<msg t='sys'><body action='{action}' r='0'>{body}</body></msg>\u{0}")
    }

    #[test]
    fn decodes_xml_frame_and_strips_trailing_nul() {
        let frame = xml_frame("apiOK", "");
        let packet = decode(&frame).expect("decodes");
        assert_eq!(packet.dialect, Dialect::Xml);
        assert_eq!(packet.command, "apiOK");
        assert_eq!(packet.error_code, 0);
    }

    #[test]
    fn decodes_xml_frame_with_inner_body_text() {
        let frame = xml_frame("rlu", "<login z='EmpireEx_21'/>");
        let packet = decode(&frame).expect("decodes");
        assert_eq!(packet.command, "rlu");
        assert_eq!(packet.payload.as_str(), Some("<login z='EmpireEx_21'/>"));
    }

    #[test]
    fn decodes_extension_frame_with_json_body_and_error_code() {
        let frame = "%xt%EmpireEx_21%lli%1%{\"error_code\":0,\"CD\":5}%";
        let packet = decode(frame).expect("decodes");
        assert_eq!(packet.dialect, Dialect::Extension);
        assert_eq!(packet.command, "lli");
        assert_eq!(packet.zone.as_deref(), Some("EmpireEx_21"));
        assert_eq!(packet.error_code, 0);
        assert_eq!(packet.field("CD").and_then(|v| v.as_i64()), Some(5));
    }

    #[test]
    fn extension_body_percent_is_not_mistaken_for_a_frame_boundary() {
        let frame = "%xt%EmpireEx_21%acm%1%{\"TXT\":\"100% done\"}%";
        let packet = decode(frame).expect("decodes");
        assert_eq!(
            packet.field("TXT").and_then(|v| v.as_str()),
            Some("100% done")
        );
    }

    #[test]
    fn decodes_extension_frame_with_positional_body() {
        let frame = "%xt%EmpireEx_21%xyz%1%0%foo%bar%";
        let packet = decode(frame).expect("decodes");
        assert_eq!(packet.error_code, 0);
        assert!(packet.payload.is_array());
    }

    #[test]
    fn positional_body_nonzero_first_token_is_the_error_code() {
        let frame = "%xt%EmpireEx_21%xyz%1%12%";
        let packet = decode(frame).expect("decodes");
        assert_eq!(packet.error_code, 12);
    }

    #[test]
    fn rejects_unrecognized_frame_shape() {
        assert!(decode("not a frame at all").is_err());
    }

    #[test]
    fn encode_extension_round_trips_a_json_object() {
        let body = json!({"PID": 42});
        let frame = encode_extension("EmpireEx_21", "gpi", "3", &body);
        assert_eq!(frame, "%xt%EmpireEx_21%gpi%3%{\"PID\":42}%");
        let packet = decode(&frame).expect("decodes");
        assert_eq!(packet.field("PID").and_then(|v| v.as_i64()), Some(42));
    }

    #[test]
    fn codec_round_trips_an_xml_frame() {
        let original = decode(&xml_frame("apiOK", "")).expect("decodes");
        let re_decoded = decode(&encode(&original)).expect("re-decodes");
        assert_eq!(re_decoded, original);
    }

    #[test]
    fn codec_round_trips_an_extension_frame() {
        let frame = "%xt%EmpireEx_21%gpi%7%{\"PID\":42,\"N\":\"Hero\"}%";
        let original = decode(frame).expect("decodes");
        let re_decoded = decode(&encode(&original)).expect("re-decodes");
        assert_eq!(re_decoded, original);
    }

    #[test]
    fn chat_text_escape_round_trips() {
        let original = "50% off \"deal\" it's great\nnext line\\end";
        let escaped = escape_chat_text(original);
        assert_eq!(unescape_chat_text(&escaped), original);
    }
}
