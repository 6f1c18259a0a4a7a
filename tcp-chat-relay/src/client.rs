use anyhow::{Context, Result};
use tokio::{
    io::{
        self, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
        BufReader,
    },
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::cli::ClientArgs;

const RECV_BUFFER: usize = 4096;
const QUIT_COMMAND: &str = "/quit";

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(&args).await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    run_client_loop(&mut reader, &mut writer, &mut stdin, &mut stdout).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(args: &ClientArgs) -> Result<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    Ok(stream.into_split())
}

enum Event {
    Server(io::Result<usize>),
    Input(io::Result<usize>),
    Interrupt(io::Result<()>),
}

async fn run_client_loop<R, W, I, O>(
    reader: &mut R,
    writer: &mut W,
    stdin: &mut I,
    stdout: &mut O,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; RECV_BUFFER];
    let mut input = String::new();

    loop {
        // `input` is only cleared once a full line was handled, so a
        // partially read line survives the other branches winning.
        let event = select! {
            read = reader.read(&mut buffer) => Event::Server(read),
            line = stdin.read_line(&mut input) => Event::Input(line),
            ctrl_c = tokio::signal::ctrl_c() => Event::Interrupt(ctrl_c),
        };

        let keep_going = match event {
            Event::Server(read) => handle_server_bytes(read, &buffer, stdout).await?,
            Event::Input(line) => {
                let keep_going = handle_stdin_input(line, &input, writer, stdout).await?;
                input.clear();
                keep_going
            }
            Event::Interrupt(result) => {
                handle_ctrl_c(result);
                false
            }
        };

        if !keep_going {
            break;
        }
    }

    Ok(())
}

async fn handle_server_bytes<O>(
    read: io::Result<usize>,
    buffer: &[u8],
    stdout: &mut O,
) -> Result<bool>
where
    O: AsyncWrite + Unpin,
{
    let bytes = read.context("failed to read from server")?;
    if bytes == 0 {
        write_line(stdout, "*** server closed the connection").await?;
        return Ok(false);
    }

    stdout.write_all(&buffer[..bytes]).await?;
    stdout.flush().await?;
    Ok(true)
}

async fn handle_stdin_input<W, O>(
    bytes_read: io::Result<usize>,
    input: &str,
    writer: &mut W,
    stdout: &mut O,
) -> Result<bool>
where
    W: AsyncWrite + Unpin,
    O: AsyncWrite + Unpin,
{
    if bytes_read? == 0 {
        return Ok(false);
    }

    if input.trim_end().eq_ignore_ascii_case(QUIT_COMMAND) {
        write_line(stdout, "*** leaving chat").await?;
        return Ok(false);
    }

    writer
        .write_all(input.as_bytes())
        .await
        .context("failed to send to server")?;
    writer.flush().await?;
    Ok(true)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection<W>(writer: &mut W)
where
    W: AsyncWrite + Unpin,
{
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_line<O>(stdout: &mut O, line: &str) -> io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn typed_lines_are_sent_with_their_newline() {
        let (mut relay_side, mut client_writer) = tokio::io::duplex(1024);
        let (mut stdout, _terminal) = tokio::io::duplex(1024);

        let keep_going = handle_stdin_input(Ok(6), "hello\n", &mut client_writer, &mut stdout)
            .await
            .expect("send line");
        assert!(keep_going);

        let mut sent = [0u8; 6];
        relay_side.read_exact(&mut sent).await.expect("relay reads");
        assert_eq!(&sent, b"hello\n");
    }

    #[tokio::test]
    async fn quit_ends_the_session_without_sending() {
        let (mut relay_side, mut client_writer) = tokio::io::duplex(1024);
        let (mut stdout, mut terminal) = tokio::io::duplex(1024);

        let keep_going = handle_stdin_input(Ok(6), "/quit\n", &mut client_writer, &mut stdout)
            .await
            .expect("quit");
        assert!(!keep_going);

        drop(client_writer);
        let mut sent = Vec::new();
        relay_side.read_to_end(&mut sent).await.expect("relay reads");
        assert!(sent.is_empty());

        drop(stdout);
        let mut printed = String::new();
        terminal
            .read_to_string(&mut printed)
            .await
            .expect("terminal reads");
        assert_eq!(printed, "*** leaving chat\n");
    }

    #[tokio::test]
    async fn server_bytes_are_printed_verbatim() {
        let (mut stdout, mut terminal) = tokio::io::duplex(1024);

        let keep_going = handle_server_bytes(Ok(3), b"hi\nxyz", &mut stdout)
            .await
            .expect("print");
        assert!(keep_going);

        drop(stdout);
        let mut printed = Vec::new();
        terminal.read_to_end(&mut printed).await.expect("terminal reads");
        assert_eq!(printed, b"hi\n");
    }

    #[tokio::test]
    async fn server_eof_ends_the_session() {
        let (mut stdout, _terminal) = tokio::io::duplex(1024);
        let keep_going = handle_server_bytes(Ok(0), &[], &mut stdout)
            .await
            .expect("print");
        assert!(!keep_going);
    }
}
