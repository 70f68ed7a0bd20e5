//! One echo round trip per message type in the catalog.

use pkll::{Envelope, MessageCode};
use rmpv::Value;

use crate::fixture::{fixture, start, ECHO};

fn body_for(code: MessageCode, request_id: u64) -> Value {
    let mut fields = vec![(Value::from("requestId"), Value::from(request_id))];
    match code {
        MessageCode::NewEvaluator => {
            fields.push((
                Value::from("allowedModules"),
                Value::Array(vec![Value::from("pkl:"), Value::from("repl:")]),
            ));
            fields.push((Value::from("allowedResources"), Value::Array(vec![Value::from("env:")])));
        }
        MessageCode::EvaluateResponse | MessageCode::EvaluateReadResponse => {
            fields.push((Value::from("evaluatorId"), Value::from(-42)));
            fields.push((Value::from("result"), Value::Binary(vec![0x93, 0x01, 0x02, 0x03])));
        }
        MessageCode::EvaluateLog => {
            fields.push((Value::from("level"), Value::from(1)));
            fields.push((Value::from("message"), Value::from("trace(x) = 1")));
        }
        _ => {
            fields.push((Value::from("evaluatorId"), Value::from(-42)));
        }
    }
    Value::Map(fields)
}

#[test]
fn test_every_message_code_round_trips() {
    let mut fx = fixture(ECHO);
    start(&mut fx.server);

    for code in MessageCode::ALL {
        let request_id = fx.server.next_request_id();
        let expected = Envelope {
            code,
            body: body_for(code, request_id),
        };

        let replies: Vec<Envelope> = fx
            .server
            .send_and_receive(&expected)
            .unwrap()
            .envelopes()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(replies, vec![expected], "round trip of {}", code);
    }
}
