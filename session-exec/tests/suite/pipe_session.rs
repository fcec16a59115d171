use std::path::PathBuf;
use std::time::Duration;

use portal_session_exec::ExecError;
use portal_session_exec::ShellCommand;
use portal_session_exec::UserAccount;
use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::current_credential;
use super::discard;
use super::executor;
use super::read_all;
use super::session;
use super::session_with_input;
use super::sh;

const SESSION_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipe_session_separates_output_streams_and_reports_exit_code() -> anyhow::Result<()> {
    let (session, peer) = session_with_input("echo out; echo err 1>&2; exit 3", b"");

    let end = tokio::time::timeout(SESSION_DEADLINE, executor().execute(session, &sh())).await??;
    let (stdout, stderr) = tokio::join!(read_all(peer.stdout), read_all(peer.stderr));

    assert_eq!(end.exit_code, Some(3));
    assert_eq!(stdout, "out\n");
    assert_eq!(stderr, "err\n");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipe_session_feeds_stdin_to_process() -> anyhow::Result<()> {
    let (session, peer) = session_with_input("read line; echo got:$line", b"hello\n");

    let end = tokio::time::timeout(SESSION_DEADLINE, executor().execute(session, &sh())).await??;

    assert_eq!(end.exit_code, Some(0));
    assert_eq!(read_all(peer.stdout).await, "got:hello\n");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipe_session_finishes_while_input_keeps_flowing() -> anyhow::Result<()> {
    let (session, mut peer) = session("echo done", None, CancellationToken::new());
    let mut input = peer.stdin.take().ok_or_else(|| anyhow::anyhow!("missing stdin"))?;
    let feeder = tokio::spawn(async move {
        while input.write_all(b"more input\n").await.is_ok() {
            tokio::task::yield_now().await;
        }
    });

    let end = tokio::time::timeout(SESSION_DEADLINE, executor().execute(session, &sh())).await??;

    assert_eq!(end.exit_code, Some(0));
    assert_eq!(read_all(peer.stdout).await, "done\n");
    tokio::time::timeout(SESSION_DEADLINE, feeder).await??;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipe_session_cancel_ends_without_exit_code() -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let (mut session, _peer) = session("sleep 30", None, cancel.clone());
    session.stderr = discard();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let end = tokio::time::timeout(SESSION_DEADLINE, executor().execute(session, &sh())).await??;

    assert_eq!(end.exit_code, None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipe_session_reports_spawn_failure() {
    let (session, _peer) = session_with_input("true", b"");
    let mut shell = sh();
    shell.program = PathBuf::from("/nonexistent/portal-shell");

    let result = executor().execute(session, &shell).await;

    assert!(
        matches!(result, Err(ExecError::PipeSpawn { ref program, .. }) if program == "/nonexistent/portal-shell"),
        "unexpected result: {result:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipe_session_runs_from_root_when_home_is_missing() -> anyhow::Result<()> {
    let credential = current_credential();
    let account = UserAccount {
        name: "tester".to_string(),
        uid: credential.uid,
        gid: credential.gid,
        home: PathBuf::from("/nonexistent/portal-tester"),
        shell: PathBuf::from("/bin/sh"),
    };
    let shell = ShellCommand::login_shell(&account);
    let (session, peer) = session_with_input("pwd; echo $HOME", b"");

    let end = tokio::time::timeout(SESSION_DEADLINE, executor().execute(session, &shell)).await??;

    assert_eq!(end.exit_code, Some(0));
    assert_eq!(read_all(peer.stdout).await, "/\n/nonexistent/portal-tester\n");
    Ok(())
}
