/// Style instruction sent with every generation. Users cannot edit it.
pub const MEMORIAL_PORTRAIT_PROMPT: &str = "Transform this photo into a dignified memorial portrait. \
Keep the person's face, expression and likeness exactly as in the original. \
Dress the person in simple formal attire, use soft even studio lighting and a plain, \
muted gradient background. Produce a calm, respectful, photorealistic head-and-shoulders \
portrait centred in the frame, suitable for a memorial service.";
