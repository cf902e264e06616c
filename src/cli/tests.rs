use super::*;
use crate::core::test_helpers::{sample_tool, text_reply, FakeTransport, ScriptedModel};

async fn session_with(replies: Vec<&str>) -> (Session, Arc<FakeTransport>, Arc<ScriptedModel>) {
    let transport = Arc::new(FakeTransport::new(vec![sample_tool("echo")]));
    let model = Arc::new(ScriptedModel::new(
        replies.into_iter().map(|reply| Ok(text_reply(reply))).collect(),
    ));
    let session = Session::bootstrap(transport.clone(), model.clone(), "{tools}")
        .await
        .expect("bootstrap succeeds");
    (session, transport, model)
}

#[test]
fn args_accept_script_model_and_log() {
    let args = Args::try_parse_from([
        "toolbridge",
        "server.py",
        "-m",
        "gpt-4o-mini",
        "--log",
        "run.log",
    ])
    .expect("args parse");
    assert_eq!(args.server_script, Some(PathBuf::from("server.py")));
    assert_eq!(args.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(args.log.as_deref(), Some("run.log"));
}

#[test]
fn args_allow_missing_script() {
    let args = Args::try_parse_from(["toolbridge"]).expect("args parse");
    assert!(args.server_script.is_none());
}

#[tokio::test]
async fn loop_answers_until_quit() {
    let (mut session, _transport, model) =
        session_with(vec!["first answer", "second answer"]).await;
    let input: &[u8] = b"  hello  \nwhat next?\n QUIT \nnever sent\n";
    let mut output = Vec::new();

    chat_loop(&mut session, input, &mut output)
        .await
        .expect("loop succeeds");
    session.shutdown().await;

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.contains("\nfirst answer\n"));
    assert!(printed.contains("\nsecond answer\n"));

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages[1].content, "hello");
    assert_eq!(requests[1].messages.last().unwrap().content, "what next?");
}

#[tokio::test]
async fn loop_stops_at_end_of_input() {
    let (mut session, transport, model) = session_with(vec!["only"]).await;
    let input: &[u8] = b"one question";
    let mut output = Vec::new();

    chat_loop(&mut session, input, &mut output)
        .await
        .expect("loop succeeds");
    session.shutdown().await;

    assert_eq!(model.requests().len(), 1);
    assert_eq!(transport.shutdowns(), 1);
    assert!(String::from_utf8(output)
        .unwrap()
        .ends_with("\nonly\n\nQuery: "));
}
