use anyhow::{Context, Result, bail};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    message::{Message, QUIT_COMMAND, ServerFrame, read_message, write_message},
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(&args).await?;
    send_credentials(&mut writer, &args).await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    let result = run_client_loop(&mut reader, &mut writer, &mut stdin, &mut input, &args.user).await;
    shutdown_connection(&mut writer).await;

    result
}

async fn establish_connection(args: &ClientArgs) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

async fn send_credentials(writer: &mut OwnedWriteHalf, args: &ClientArgs) -> Result<()> {
    write_message(writer, &Message::new(&args.user, &args.token))
        .await
        .context("failed to send credentials")?;
    Ok(())
}

async fn run_client_loop(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut BufReader<tokio::io::Stdin>,
    input: &mut String,
    user: &str,
) -> Result<()> {
    loop {
        input.clear();
        select! {
            server_frame = read_message::<_, ServerFrame>(reader) => {
                if !handle_server_frame(server_frame, user).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(input) => {
                if !handle_stdin_input(bytes_read, input, user, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_frame(frame: io::Result<Option<ServerFrame>>, user: &str) -> Result<bool> {
    match frame {
        Ok(Some(ServerFrame::Chat { sender, text })) => {
            // Own messages come back from the server; the sender tag is authoritative.
            if sender != user {
                write_stdout(&format!("[{sender}] {text}")).await?;
            }
            Ok(true)
        }
        Ok(Some(ServerFrame::PermissionDenied { reason })) => {
            bail!("Access denied: {reason}")
        }
        Ok(None) => {
            write_stdout("Server disconnected").await?;
            Ok(false)
        }
        Err(err) => {
            write_stdout(&format!("Server disconnected: {err}")).await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_input(
    bytes_read: io::Result<usize>,
    input: &str,
    user: &str,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let bytes_read = bytes_read?;
    if bytes_read == 0 {
        return Ok(false);
    }

    let text = input.trim_end();
    if text.is_empty() {
        return Ok(true);
    }

    write_message(writer, &Message::new(user, text)).await?;

    if text == QUIT_COMMAND {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }
    Ok(true)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
