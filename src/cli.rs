use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};

use roost_core::channel::{Channel, ChannelError, ChannelMessage, MessageId};
use roost_core::confirm::{ConfirmationRequest, Resolver};

const PREFIX: &str = "roost> ";

/// Terminal channel: one local user, lines in on stdin, replies out on stdout.
///
/// The terminal cannot rewrite earlier output, so an edit that extends the open message prints
/// only the new suffix and any other edit reprints the message on a fresh line.
#[derive(Debug)]
pub struct CliChannel<R = BufReader<Stdin>, W = Stdout> {
    lines: Lines<R>,
    out: W,
    user_id: String,
    next_id: u64,
    open: Option<(MessageId, String)>,
}

impl CliChannel {
    #[must_use]
    pub fn stdio(user_id: impl Into<String>) -> Self {
        Self::with_io(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            user_id,
        )
    }
}

impl<R, W> CliChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_io(input: R, out: W, user_id: impl Into<String>) -> Self {
        Self {
            lines: input.lines(),
            out,
            user_id: user_id.into(),
            next_id: 0,
            open: None,
        }
    }

    async fn write(&mut self, text: &str) -> Result<(), ChannelError> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn close_open(&mut self) -> Result<(), ChannelError> {
        if self.open.take().is_some() {
            self.write("\n").await?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.out
    }
}

impl<R, W> Channel for CliChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<ChannelMessage>, ChannelError> {
        self.close_open().await?;
        loop {
            self.write("you> ").await?;
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            let trimmed = line.trim();
            if trimmed == "exit" || trimmed == "quit" {
                return Ok(None);
            }
            if !trimmed.is_empty() {
                return Ok(Some(ChannelMessage::new(self.user_id.clone(), trimmed)));
            }
        }
    }

    async fn send(&mut self, text: &str) -> Result<MessageId, ChannelError> {
        self.close_open().await?;
        self.next_id += 1;
        let id = MessageId(self.next_id);
        self.write(&format!("{PREFIX}{text}")).await?;
        self.open = Some((id, text.to_owned()));
        Ok(id)
    }

    async fn edit(&mut self, id: MessageId, text: &str) -> Result<(), ChannelError> {
        if let Some((open_id, shown)) = &self.open
            && *open_id == id
            && let Some(delta) = text.strip_prefix(shown.as_str())
        {
            let delta = delta.to_owned();
            self.write(&delta).await?;
            self.open = Some((id, text.to_owned()));
            return Ok(());
        }
        self.close_open().await?;
        self.write(&format!("{PREFIX}{text}")).await?;
        self.open = Some((id, text.to_owned()));
        Ok(())
    }

    async fn delete(&mut self, id: MessageId) -> Result<(), ChannelError> {
        if self.open.as_ref().is_some_and(|(open_id, _)| *open_id == id) {
            self.close_open().await?;
        }
        Ok(())
    }

    async fn request_approval(
        &mut self,
        request: &ConfirmationRequest,
        resolver: Resolver,
    ) -> Result<(), ChannelError> {
        self.close_open().await?;
        self.write(&format!("{}\n[y/N]: ", request.prompt_text()))
            .await?;

        match tokio::time::timeout(request.display_timeout, self.lines.next_line()).await {
            Ok(Ok(Some(answer))) if answer.trim().eq_ignore_ascii_case("y") => {
                resolver.approve();
            }
            Ok(Ok(_)) => {
                resolver.deny();
            }
            Ok(Err(e)) => {
                resolver.deny();
                return Err(e.into());
            }
            Err(_) => {
                resolver.expire();
                self.write("\n(confirmation expired)\n").await?;
            }
        }
        Ok(())
    }
}
